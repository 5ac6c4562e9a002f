//! Brokkr - Python gRPC package generation from proto definitions
//!
//! This crate turns a directory of `.proto` service definitions into
//! self-contained, installable Python packages: one client and one server
//! package per service, each vendoring its own protobuf stubs so nothing
//! depends on a shared schema package at runtime.
//!
//! The external protobuf/gRPC toolchain is driven as a black box; brokkr
//! owns everything around it: compiling stubs into scratch space, vendoring
//! them with package-absolute imports, synthesizing the installable surface
//! (`pyproject.toml`, README, `__init__`, wrapper module), validating what
//! actually landed on disk, and reporting per package with failures
//! isolated to the package that caused them.
//!
//! # Example
//!
//! ```rust,no_run
//! use brokkr::{BuildConfig, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> brokkr::Result<()> {
//!     let pipeline = Pipeline::with_default_compiler(BuildConfig::default());
//!     let report = pipeline.run(false).await?;
//!     print!("{}", report.render());
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod catalog;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod validate;

// Re-export main types at crate root
pub use catalog::{PackageSpec, Role, RpcMethod, ServiceSpec, catalog};
pub use compiler::{GrpcToolsCompiler, StubCompiler};
pub use config::BuildConfig;
pub use error::{BrokkrError, Result};
pub use pipeline::Pipeline;
pub use report::{BuildStatus, PackageReport, RunReport, Stage};
