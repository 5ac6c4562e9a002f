//! Package assembly.
//!
//! Takes the stub modules the compiler dropped in a scratch directory and
//! turns them into one self-contained package directory. Assembly is split
//! into three steps the orchestrator drives in order: [`stage_stubs`] copies
//! the declared stub modules into a staging directory with their sibling
//! imports rewritten, [`write_metadata`] adds the synthesized artifacts, and
//! [`publish`] swaps the staging directory into place with a single rename.
//! A failed or interrupted build therefore never leaves a half-written
//! package visible; staging directories clean themselves up on drop.
//!
//! The set of files a package contains is declared up front in
//! [`PackageLayout`]; assembly writes exactly that list and dry-run reports
//! exactly that list, from the same computation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::catalog::PackageSpec;
use crate::codegen::RenderedPackage;
use crate::config::BuildConfig;
use crate::error::{BrokkrError, Result};

/// The planned contents of one package directory, as paths relative to it.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    package: String,
    wrapper: &'static str,
    stubs: Vec<String>,
}

impl PackageLayout {
    pub fn new(spec: &PackageSpec) -> Self {
        Self {
            package: spec.name(),
            wrapper: spec.wrapper_file(),
            stubs: spec.vendored_stub_modules(),
        }
    }

    /// Every file the package will contain, in write order: metadata first,
    /// then the importable module directory.
    pub fn planned_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            PathBuf::from("pyproject.toml"),
            PathBuf::from("README.md"),
            Path::new(&self.package).join("__init__.py"),
            Path::new(&self.package).join(self.wrapper),
        ];
        for stub in &self.stubs {
            files.push(Path::new(&self.package).join(format!("{stub}.py")));
        }
        files
    }

    /// Final on-disk location of the package under the packages root.
    pub fn final_dir(&self, config: &BuildConfig) -> PathBuf {
        config.packages_root().join(&self.package)
    }
}

/// A package being built: a self-cleaning staging directory holding the
/// partially assembled tree.
pub struct Staging {
    tempdir: tempfile::TempDir,
    module_dir: PathBuf,
    layout: PackageLayout,
}

impl Staging {
    fn root(&self) -> &Path {
        self.tempdir.path()
    }
}

/// One finished package: where it landed and what it contains (paths
/// relative to `dir`, in the layout's order).
#[derive(Debug, Clone)]
pub struct AssembledPackage {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Create the staging tree and vendor the declared stub modules into it,
/// rewriting their sibling imports to package-absolute form. A declared
/// module the compiler did not produce is an assembly error.
pub async fn stage_stubs(
    spec: &PackageSpec,
    stub_dir: &Path,
    config: &BuildConfig,
) -> Result<Staging> {
    let package = spec.name();
    let packages_root = config.packages_root();

    fs::create_dir_all(&packages_root)
        .await
        .map_err(|err| BrokkrError::fs(&packages_root, err))?;

    // Staging lives under the packages root so the publish rename never
    // crosses a filesystem boundary.
    let tempdir = tempfile::Builder::new()
        .prefix(&format!(".{package}-stage-"))
        .tempdir_in(&packages_root)
        .map_err(|err| BrokkrError::fs(&packages_root, err))?;

    let module_dir = tempdir.path().join(&package);
    fs::create_dir(&module_dir)
        .await
        .map_err(|err| BrokkrError::fs(&module_dir, err))?;

    let vendored: HashSet<String> = spec.vendored_stub_modules().into_iter().collect();
    let raw: HashSet<String> = spec.raw_stub_modules().into_iter().collect();

    for stub in spec.vendored_stub_modules() {
        let file_name = format!("{stub}.py");
        let source_path = stub_dir.join(&file_name);
        let source = match fs::read_to_string(&source_path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BrokkrError::Assembly {
                    package: package.clone(),
                    reason: format!("declared stub module {file_name} was not compiled"),
                });
            }
            Err(err) => return Err(BrokkrError::fs(&source_path, err)),
        };
        let rewritten = rewrite_imports(&source, &package, &vendored, &raw, &file_name)?;
        write_text(&module_dir.join(&file_name), &rewritten).await?;
    }

    Ok(Staging {
        tempdir,
        module_dir,
        layout: PackageLayout::new(spec),
    })
}

/// Write the synthesized artifacts into the staging tree.
pub async fn write_metadata(
    staging: &Staging,
    spec: &PackageSpec,
    rendered: &RenderedPackage,
) -> Result<()> {
    write_text(&staging.root().join("pyproject.toml"), &rendered.manifest).await?;
    write_text(&staging.root().join("README.md"), &rendered.readme).await?;
    write_text(&staging.module_dir.join("__init__.py"), &rendered.init).await?;
    write_text(&staging.module_dir.join(spec.wrapper_file()), &rendered.wrapper).await
}

/// Replace the final directory wholesale with the staged tree. Stale files
/// from earlier runs cannot survive the swap.
pub async fn publish(staging: Staging, config: &BuildConfig) -> Result<AssembledPackage> {
    let final_dir = staging.layout.final_dir(config);

    if fs::metadata(&final_dir).await.is_ok() {
        fs::remove_dir_all(&final_dir)
            .await
            .map_err(|err| BrokkrError::fs(&final_dir, err))?;
    }
    fs::rename(staging.root(), &final_dir)
        .await
        .map_err(|err| BrokkrError::fs(&final_dir, err))?;
    // The tempdir guard's cleanup now points at a path the rename vacated;
    // nothing is left to remove. On the error paths above it removes the
    // partial staging tree.
    let files = staging.layout.planned_files();
    drop(staging);

    debug!(dir = %final_dir.display(), "package published");
    Ok(AssembledPackage {
        dir: final_dir,
        files,
    })
}

/// All three assembly steps in order, for callers that do not need
/// per-stage attribution.
pub async fn assemble_package(
    spec: &PackageSpec,
    stub_dir: &Path,
    rendered: &RenderedPackage,
    config: &BuildConfig,
) -> Result<AssembledPackage> {
    let staging = stage_stubs(spec, stub_dir, config).await?;
    write_metadata(&staging, spec, rendered).await?;
    publish(staging, config).await
}

async fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text)
        .await
        .map_err(|err| BrokkrError::fs(path, err))
}

/// Rewrite sibling stub imports to package-absolute form, line by line.
///
/// Only the statement shapes the stub compiler emits are rewritten:
///
/// ```text
/// import audio_message_pb2 as audio__message__pb2
/// import audio_message_pb2
/// from audio_message_pb2 import Thing
/// ```
///
/// become
///
/// ```text
/// import pkg.audio_message_pb2 as audio__message__pb2
/// import pkg.audio_message_pb2 as audio_message_pb2
/// from pkg.audio_message_pb2 import Thing
/// ```
///
/// The plain form gains an alias so the name the rest of the module uses
/// stays bound. An import of a stub module that is not vendored into this
/// package, or a mention of a stub module in an import line too unusual to
/// rewrite mechanically, is an error rather than a guess.
pub fn rewrite_imports(
    source: &str,
    package: &str,
    vendored: &HashSet<String>,
    raw: &HashSet<String>,
    module_label: &str,
) -> Result<String> {
    let mut out = String::with_capacity(source.len() + 256);

    for line in source.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        out.push_str(&rewrite_line(body, package, vendored, raw, module_label)?);
        out.push_str(newline);
    }

    Ok(out)
}

fn rewrite_line(
    line: &str,
    package: &str,
    vendored: &HashSet<String>,
    raw: &HashSet<String>,
    module_label: &str,
) -> Result<String> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, stmt) = line.split_at(indent_len);

    if let Some(rest) = stmt.strip_prefix("import ") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        match tokens.as_slice() {
            [module] if vendored.contains(*module) => {
                return Ok(format!("{indent}import {package}.{module} as {module}"));
            }
            [module, "as", alias] if vendored.contains(*module) => {
                return Ok(format!("{indent}import {package}.{module} as {alias}"));
            }
            // already package-absolute, nothing to do
            [module] | [module, "as", _] if is_package_qualified(module, package, vendored) => {
                return Ok(line.to_string());
            }
            _ => {}
        }
    } else if let Some(rest) = stmt.strip_prefix("from ") {
        if let Some((module, imported)) = rest.split_once(" import ") {
            let module = module.trim();
            if vendored.contains(module) {
                return Ok(format!(
                    "{indent}from {package}.{module} import {imported}"
                ));
            }
            if is_package_qualified(module, package, vendored) {
                return Ok(line.to_string());
            }
        }
    } else {
        // not an import statement at all
        return Ok(line.to_string());
    }

    // An import line that did not match a rewritable shape: if it touches a
    // stub module at all, refuse rather than guess.
    for word in stmt.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if raw.contains(word) {
            return Err(BrokkrError::UnsafeImportRewrite {
                module: module_label.to_string(),
                statement: line.trim().to_string(),
            });
        }
    }

    Ok(line.to_string())
}

/// Is `module` the package-absolute spelling of a vendored stub?
fn is_package_qualified(module: &str, package: &str, vendored: &HashSet<String>) -> bool {
    module
        .strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|stub| vendored.contains(stub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;

    fn sets(spec: &PackageSpec) -> (HashSet<String>, HashSet<String>) {
        (
            spec.vendored_stub_modules().into_iter().collect(),
            spec.raw_stub_modules().into_iter().collect(),
        )
    }

    #[test]
    fn aliased_import_becomes_package_absolute() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        let source = "import audio_message_pb2 as audio__message__pb2\n";
        let rewritten =
            rewrite_imports(source, "transcribeclient", &vendored, &raw, "x.py").unwrap();
        assert_eq!(
            rewritten,
            "import transcribeclient.audio_message_pb2 as audio__message__pb2\n"
        );
    }

    #[test]
    fn plain_import_gains_an_alias_to_keep_the_binding() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        let rewritten = rewrite_imports(
            "import transcribe_interface_pb2\n",
            "transcribeclient",
            &vendored,
            &raw,
            "x.py",
        )
        .unwrap();
        assert_eq!(
            rewritten,
            "import transcribeclient.transcribe_interface_pb2 as transcribe_interface_pb2\n"
        );
    }

    #[test]
    fn from_import_is_rewritten_in_place() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        let rewritten = rewrite_imports(
            "from audio_message_pb2 import AudioMessage\n",
            "transcribeclient",
            &vendored,
            &raw,
            "x.py",
        )
        .unwrap();
        assert_eq!(
            rewritten,
            "from transcribeclient.audio_message_pb2 import AudioMessage\n"
        );
    }

    #[test]
    fn unrelated_imports_and_code_pass_through_untouched() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        let source = "\
\"\"\"Generated by the gRPC Python protocol compiler plugin.\"\"\"\n\
import grpc\n\
from google.protobuf import descriptor as _descriptor\n\
DESCRIPTOR = None\n";
        let rewritten =
            rewrite_imports(source, "transcribeclient", &vendored, &raw, "x.py").unwrap();
        assert_eq!(rewritten, source);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        let once = rewrite_imports(
            "import audio_message_pb2 as a\n",
            "transcribeclient",
            &vendored,
            &raw,
            "x.py",
        )
        .unwrap();
        let twice =
            rewrite_imports(&once, "transcribeclient", &vendored, &raw, "x.py").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn import_of_unvendored_stub_is_refused() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        // emitted by the compiler but deliberately not shipped
        let err = rewrite_imports(
            "import audio_message_pb2_grpc\n",
            "transcribeclient",
            &vendored,
            &raw,
            "weird_pb2.py",
        )
        .unwrap_err();
        match err {
            BrokkrError::UnsafeImportRewrite { module, statement } => {
                assert_eq!(module, "weird_pb2.py");
                assert!(statement.contains("audio_message_pb2_grpc"));
            }
            other => panic!("expected UnsafeImportRewrite, got {other:?}"),
        }
    }

    #[test]
    fn odd_import_shapes_touching_stubs_are_refused() {
        let spec = &catalog()[0];
        let (vendored, raw) = sets(spec);
        let err = rewrite_imports(
            "import grpc, audio_message_pb2\n",
            "transcribeclient",
            &vendored,
            &raw,
            "x.py",
        )
        .unwrap_err();
        assert!(matches!(err, BrokkrError::UnsafeImportRewrite { .. }));
    }

    #[test]
    fn planned_files_cover_metadata_and_module_dir() {
        let layout = PackageLayout::new(&catalog()[0]);
        let files = layout.planned_files();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "pyproject.toml",
                "README.md",
                "transcribeclient/__init__.py",
                "transcribeclient/client.py",
                "transcribeclient/audio_message_pb2.py",
                "transcribeclient/transcribe_interface_pb2.py",
                "transcribeclient/transcribe_interface_pb2_grpc.py",
            ]
        );
    }
}
