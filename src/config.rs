//! Build configuration threaded through the pipeline.
//!
//! There is no ambient configuration: the CLI (or a test) constructs one
//! `BuildConfig` and every component receives it as a parameter. Environment
//! lookup and `.env` loading happen in the binary, before this struct exists.

use std::path::PathBuf;

use crate::{BrokkrError, Result};

/// Default output root, relative to the working directory. Overridden by the
/// `OUTPUT_DIR` environment variable or the `--output-root` flag.
pub const DEFAULT_OUTPUT_ROOT: &str = "generated_packages";

/// Default location of the schema source set.
pub const DEFAULT_PROTO_DIR: &str = "proto";

/// Version stamped into every generated manifest unless overridden.
pub const DEFAULT_PACKAGE_VERSION: &str = "0.1.0";

/// Default compiler command line; the module interface of
/// `grpc_tools.protoc` is the only thing assumed about it.
pub const DEFAULT_COMPILER: &str = "python3 -m grpc_tools.protoc";

/// Hard ceiling on one compiler invocation.
pub const DEFAULT_COMPILER_TIMEOUT_SECS: u64 = 120;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory containing the proto source set.
    pub proto_dir: PathBuf,
    /// Root under which `packages/` is created.
    pub output_root: PathBuf,
    /// Version string written into every generated manifest.
    pub package_version: String,
    /// Compiler argv; proto paths and output flags are appended per run.
    pub compiler_argv: Vec<String>,
    /// Hard timeout for one compiler invocation.
    pub compiler_timeout_secs: u64,
    /// Build packages one at a time instead of as parallel tasks.
    pub sequential: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            proto_dir: PathBuf::from(DEFAULT_PROTO_DIR),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            package_version: DEFAULT_PACKAGE_VERSION.to_string(),
            compiler_argv: DEFAULT_COMPILER.split_whitespace().map(str::to_string).collect(),
            compiler_timeout_secs: DEFAULT_COMPILER_TIMEOUT_SECS,
            sequential: false,
        }
    }
}

impl BuildConfig {
    /// Directory all finished packages are published under.
    pub fn packages_root(&self) -> PathBuf {
        self.output_root.join("packages")
    }

    /// Absolute-or-relative path of one proto source file.
    pub fn proto_path(&self, proto_file: &str) -> PathBuf {
        self.proto_dir.join(proto_file)
    }

    /// Reject configurations no run could work with.
    pub fn check(&self) -> Result<()> {
        if self.compiler_argv.is_empty() {
            return Err(BrokkrError::Configuration(
                "compiler command is empty".to_string(),
            ));
        }
        if self.package_version.trim().is_empty() {
            return Err(BrokkrError::Configuration(
                "package version is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a compiler command string on whitespace. Quoting is not supported;
/// paths with spaces need a wrapper script.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(BrokkrError::Configuration(format!(
            "compiler command is empty: {command:?}"
        )));
    }
    Ok(argv)
}
