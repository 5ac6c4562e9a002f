//! External stub compiler boundary.
//!
//! The protobuf/gRPC toolchain is invoked as a black box: proto files and
//! flags in, `*_pb2.py` / `*_pb2_grpc.py` modules out. Its internals, flags
//! beyond the documented interface, and output file contents are all opaque
//! here. [`StubCompiler`] is the seam that keeps everything downstream
//! testable without the toolchain installed; [`GrpcToolsCompiler`] is the
//! real subprocess-backed implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::catalog::{ServiceSpec, stub_module_name};
use crate::config::BuildConfig;
use crate::error::{BrokkrError, Result};

/// Minimum gRPC runtime the emitted stubs are known to load against.
/// Written into every synthesized manifest as a floor, never a pin.
pub const GRPCIO_FLOOR: &str = "1.50.0";

/// Minimum protobuf runtime floor, matching the generated-code line the
/// toolchain currently emits.
pub const PROTOBUF_FLOOR: &str = "4.25.0";

/// Produces Python stub modules from a service's proto files.
#[async_trait]
pub trait StubCompiler: Send + Sync {
    /// Compile every proto file of `service` into `out_dir`, returning the
    /// emitted stub files in deterministic order. `out_dir` is created if
    /// absent.
    async fn compile_service(
        &self,
        service: &ServiceSpec,
        proto_dir: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>>;
}

/// Runs `grpc_tools.protoc` (or whatever argv the config carries) as a
/// subprocess with captured output and a hard timeout.
pub struct GrpcToolsCompiler {
    argv: Vec<String>,
    timeout: Duration,
}

impl GrpcToolsCompiler {
    pub fn new(argv: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            argv,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(config.compiler_argv.clone(), config.compiler_timeout_secs)
    }

    /// Full command line for one service, for spawn errors and logs.
    fn render_command(&self, extra: &[String]) -> String {
        let mut parts: Vec<&str> = self.argv.iter().map(String::as_str).collect();
        parts.extend(extra.iter().map(String::as_str));
        parts.join(" ")
    }

    /// Fail fast, per file, before spawning anything. Distinguishes a proto
    /// that is absent from one that exists but cannot be read.
    async fn check_sources(&self, service: &ServiceSpec, proto_dir: &Path) -> Result<()> {
        for proto in service.proto_files() {
            let path = proto_dir.join(proto);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    return Err(BrokkrError::SchemaUnreadable {
                        path,
                        reason: "not a regular file".to_string(),
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(BrokkrError::SchemaMissing { path });
                }
                Err(err) => {
                    return Err(BrokkrError::SchemaUnreadable {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StubCompiler for GrpcToolsCompiler {
    async fn compile_service(
        &self,
        service: &ServiceSpec,
        proto_dir: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        self.check_sources(service, proto_dir).await?;

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|err| BrokkrError::fs(out_dir, err))?;

        let mut args: Vec<String> = vec![
            format!("--proto_path={}", proto_dir.display()),
            format!("--python_out={}", out_dir.display()),
            format!("--grpc_python_out={}", out_dir.display()),
        ];
        args.extend(service.proto_files().iter().map(|p| p.to_string()));

        let command_line = self.render_command(&args);
        debug!(service = %service.name, command = %command_line, "invoking stub compiler");

        let (program, leading) = match self.argv.split_first() {
            Some(split) => split,
            None => {
                return Err(BrokkrError::Configuration(
                    "compiler command is empty".to_string(),
                ));
            }
        };

        let child = Command::new(program)
            .args(leading)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| BrokkrError::CompilerSpawn {
                command: command_line.clone(),
                reason: err.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(BrokkrError::CompilerSpawn {
                    command: command_line,
                    reason: format!("failed to collect output: {err}"),
                });
            }
            // kill_on_drop reaps the child when the future is dropped here
            Err(_) => {
                return Err(BrokkrError::CompilerTimeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let diagnostic = String::from_utf8_lossy(&output.stderr)
                .trim_end()
                .to_string();
            return Err(BrokkrError::CompilerFailed {
                status: output.status.code().unwrap_or(-1),
                diagnostic,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(service = %service.name, stderr = %stderr.trim_end(), "stub compiler warnings");
        }

        // The toolchain exiting zero is not taken at its word; every module
        // the downstream assembly step will reach for must actually exist.
        let mut emitted = Vec::new();
        for proto in service.proto_files() {
            let stub = stub_module_name(proto);
            for module in [format!("{stub}.py"), format!("{stub}_grpc.py")] {
                let path = out_dir.join(&module);
                match tokio::fs::metadata(&path).await {
                    Ok(_) => emitted.push(path),
                    Err(_) => return Err(BrokkrError::CompilerOutputMissing { module }),
                }
            }
        }

        debug!(service = %service.name, modules = emitted.len(), "stub compiler finished");
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_services;

    #[tokio::test]
    async fn missing_proto_is_reported_before_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let compiler = GrpcToolsCompiler::new(
            vec!["definitely-not-a-real-binary".to_string()],
            5,
        );
        let service = builtin_services().remove(0);

        let err = compiler
            .compile_service(&service, tmp.path(), &tmp.path().join("out"))
            .await
            .unwrap_err();
        match err {
            BrokkrError::SchemaMissing { path } => {
                assert!(path.ends_with("audio-message.proto"));
            }
            other => panic!("expected SchemaMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unspawnable_compiler_is_a_compiler_error() {
        let tmp = tempfile::tempdir().unwrap();
        let service = builtin_services().remove(0);
        for proto in service.proto_files() {
            std::fs::write(tmp.path().join(proto), "syntax = \"proto3\";\n").unwrap();
        }

        let compiler = GrpcToolsCompiler::new(
            vec!["/nonexistent/brokkr-test-protoc".to_string()],
            5,
        );
        let err = compiler
            .compile_service(&service, tmp.path(), &tmp.path().join("out"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), "compiler");
        assert!(matches!(err, BrokkrError::CompilerSpawn { .. }));
    }

    #[tokio::test]
    async fn successful_run_requires_expected_modules() {
        // `true` exits zero without emitting anything; the absence of the
        // first expected stub must be caught.
        let tmp = tempfile::tempdir().unwrap();
        let service = builtin_services().remove(0);
        for proto in service.proto_files() {
            std::fs::write(tmp.path().join(proto), "syntax = \"proto3\";\n").unwrap();
        }

        let compiler = GrpcToolsCompiler::new(vec!["true".to_string()], 5);
        let err = compiler
            .compile_service(&service, tmp.path(), &tmp.path().join("out"))
            .await
            .unwrap_err();
        match err {
            BrokkrError::CompilerOutputMissing { module } => {
                assert_eq!(module, "audio_message_pb2.py");
            }
            other => panic!("expected CompilerOutputMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_compiler_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let service = builtin_services().remove(0);
        for proto in service.proto_files() {
            std::fs::write(tmp.path().join(proto), "syntax = \"proto3\";\n").unwrap();
        }

        // extra protoc flags land in $0/$1.. and are ignored by the script
        let compiler = GrpcToolsCompiler::new(
            vec!["sh".to_string(), "-c".to_string(), "sleep 30".to_string()],
            1,
        );
        let err = compiler
            .compile_service(&service, tmp.path(), &tmp.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokkrError::CompilerTimeout { timeout_secs: 1 }));
    }
}
