//! Pipeline orchestration.
//!
//! Drives the full catalog through compile, assemble, synthesize, publish,
//! validate. Packages are independent: each runs as its own task against its
//! own scratch and staging directories, every failure is caught at the
//! package boundary, and one broken proto never stops the others. Results
//! come back in catalog order regardless of completion order.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::assemble;
use crate::catalog::{PackageSpec, catalog};
use crate::codegen;
use crate::compiler::{GrpcToolsCompiler, StubCompiler};
use crate::config::BuildConfig;
use crate::error::{BrokkrError, Result};
use crate::report::{BuildStatus, PackageReport, RunReport, Stage};
use crate::validate;

pub struct Pipeline {
    config: Arc<BuildConfig>,
    compiler: Arc<dyn StubCompiler>,
}

impl Pipeline {
    pub fn new(config: BuildConfig, compiler: Arc<dyn StubCompiler>) -> Self {
        Self {
            config: Arc::new(config),
            compiler,
        }
    }

    pub fn with_default_compiler(config: BuildConfig) -> Self {
        let compiler = Arc::new(GrpcToolsCompiler::from_config(&config));
        Self::new(config, compiler)
    }

    /// Run the whole catalog. `Err` is reserved for configuration problems;
    /// per-package failures land in the report instead.
    pub async fn run(&self, dry_run: bool) -> Result<RunReport> {
        self.config.check()?;
        let specs = catalog();
        info!(
            packages = specs.len(),
            proto_dir = %self.config.proto_dir.display(),
            output_root = %self.config.output_root.display(),
            dry_run,
            "starting package generation"
        );

        let results: Vec<PackageReport> = if dry_run {
            specs
                .into_iter()
                .map(|spec| plan_package(spec, &self.config))
                .collect()
        } else if self.config.sequential {
            let mut results = Vec::with_capacity(specs.len());
            for spec in specs {
                results.push(
                    build_package(spec, Arc::clone(&self.config), Arc::clone(&self.compiler))
                        .await,
                );
            }
            results
        } else {
            let names: Vec<String> = specs.iter().map(PackageSpec::name).collect();
            let handles: Vec<_> = specs
                .into_iter()
                .map(|spec| {
                    tokio::spawn(build_package(
                        spec,
                        Arc::clone(&self.config),
                        Arc::clone(&self.compiler),
                    ))
                })
                .collect();
            names
                .into_iter()
                .zip(join_all(handles).await)
                .map(|(name, joined)| joined.unwrap_or_else(|err| aborted(name, &err)))
                .collect()
        };

        let report = RunReport::new(dry_run, &self.config.output_root, results);
        info!(
            built = report.built_count(),
            total = report.total(),
            dry_run,
            "generation finished"
        );
        Ok(report)
    }
}

/// Build one package end to end, converting any failure into its report
/// entry.
async fn build_package(
    spec: PackageSpec,
    config: Arc<BuildConfig>,
    compiler: Arc<dyn StubCompiler>,
) -> PackageReport {
    let package = spec.name();
    info!(package = %package, "building package");

    match try_build(&spec, &config, compiler.as_ref()).await {
        Ok(assembled) => {
            info!(package = %package, files = assembled.files.len(), "package built");
            PackageReport::built(package, &assembled.dir, &assembled.files)
        }
        Err((stage, err)) => {
            warn!(package = %package, stage = %stage, error = %err, "package failed");
            PackageReport::failed(package, stage, &err)
        }
    }
}

async fn try_build(
    spec: &PackageSpec,
    config: &BuildConfig,
    compiler: &dyn StubCompiler,
) -> std::result::Result<assemble::AssembledPackage, (Stage, BrokkrError)> {
    // compiler output goes to a scratch directory that cleans up on drop;
    // nothing under the output root is touched until publish
    let scratch = tempfile::tempdir()
        .map_err(|err| (Stage::Compiling, BrokkrError::fs(std::env::temp_dir(), err)))?;

    compiler
        .compile_service(&spec.service, &config.proto_dir, scratch.path())
        .await
        .map_err(|err| (Stage::Compiling, err))?;

    let staging = assemble::stage_stubs(spec, scratch.path(), config)
        .await
        .map_err(|err| (Stage::Assembling, err))?;

    let rendered = codegen::render_package(spec, &config.package_version)
        .map_err(|err| (Stage::SynthesizingMetadata, err))?;
    assemble::write_metadata(&staging, spec, &rendered)
        .await
        .map_err(|err| (Stage::SynthesizingMetadata, err))?;

    let assembled = assemble::publish(staging, config)
        .await
        .map_err(|err| (Stage::Assembling, err))?;

    validate::validate_package(spec, &assembled.dir, config)
        .await
        .map_err(|err| (Stage::Validating, err))?;

    Ok(assembled)
}

/// Dry run for one package: the schema check and synthesis still execute,
/// the compiler and every filesystem write are suppressed. The reported file
/// list comes from the same layout computation a real run writes from.
fn plan_package(spec: PackageSpec, config: &BuildConfig) -> PackageReport {
    let package = spec.name();

    for proto in spec.service.proto_files() {
        let path = config.proto_path(proto);
        if !path.is_file() {
            let err = BrokkrError::SchemaMissing { path };
            warn!(package = %package, error = %err, "package failed");
            return PackageReport::failed(package, Stage::Compiling, &err);
        }
    }

    if let Err(err) = codegen::render_package(&spec, &config.package_version) {
        warn!(package = %package, error = %err, "package failed");
        return PackageReport::failed(package, Stage::SynthesizingMetadata, &err);
    }

    let layout = assemble::PackageLayout::new(&spec);
    PackageReport::planned(package, &layout.final_dir(config), &layout.planned_files())
}

/// A build task that panicked or was cancelled. Does not happen in normal
/// operation; reported rather than propagated so siblings still land.
fn aborted(package: String, err: &tokio::task::JoinError) -> PackageReport {
    warn!(package = %package, error = %err, "build task aborted");
    PackageReport {
        package,
        status: BuildStatus::Failed,
        files: Vec::new(),
        dir: None,
        stage: None,
        error_class: Some("internal".to_string()),
        error: Some(format!("build task aborted: {err}")),
    }
}
