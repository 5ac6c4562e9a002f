//! Brokkr error types

use std::path::PathBuf;

/// Brokkr error types, one variant group per pipeline failure class.
///
/// Every variant is fatal for the package being built and for nothing else;
/// the orchestrator records it in that package's result and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum BrokkrError {
    // Schema input errors
    #[error("proto source not found: {path}")]
    SchemaMissing { path: PathBuf },

    #[error("proto source unreadable: {path}: {reason}")]
    SchemaUnreadable { path: PathBuf, reason: String },

    // External compiler errors
    #[error("failed to spawn stub compiler `{command}`: {reason}")]
    CompilerSpawn { command: String, reason: String },

    #[error("stub compiler exited with status {status}: {diagnostic}")]
    CompilerFailed { status: i32, diagnostic: String },

    #[error("stub compiler timed out after {timeout_secs}s")]
    CompilerTimeout { timeout_secs: u64 },

    #[error("compiler reported success but produced no `{module}`")]
    CompilerOutputMissing { module: String },

    // Package assembly errors
    #[error("assembly of {package} failed: {reason}")]
    Assembly { package: String, reason: String },

    #[error("import in {module} cannot be rewritten safely: `{statement}`")]
    UnsafeImportRewrite { module: String, statement: String },

    // Post-generation validation errors
    #[error("validation of {package} found {count} violation(s): {details}")]
    Validation {
        package: String,
        count: usize,
        details: String,
    },

    // Filesystem errors, with the offending path attached
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("manifest serialization failed: {0}")]
    ManifestEncode(#[from] toml::ser::Error),
}

impl BrokkrError {
    /// Wrap an I/O error with the path it occurred at.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BrokkrError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Short lowercase class name used in report lines and logs.
    pub fn class(&self) -> &'static str {
        match self {
            BrokkrError::SchemaMissing { .. } | BrokkrError::SchemaUnreadable { .. } => "schema",
            BrokkrError::CompilerSpawn { .. }
            | BrokkrError::CompilerFailed { .. }
            | BrokkrError::CompilerTimeout { .. }
            | BrokkrError::CompilerOutputMissing { .. } => "compiler",
            BrokkrError::Assembly { .. } | BrokkrError::UnsafeImportRewrite { .. } => "assembly",
            BrokkrError::Validation { .. } => "validation",
            BrokkrError::Filesystem { .. } => "filesystem",
            BrokkrError::Configuration(_) | BrokkrError::ManifestEncode(_) => "configuration",
        }
    }
}

/// Result type alias for brokkr operations
pub type Result<T> = std::result::Result<T, BrokkrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiler_failure_keeps_diagnostic_verbatim() {
        let diag = "proto/clone-interface.proto:7:1: Expected top-level statement";
        let err = BrokkrError::CompilerFailed {
            status: 1,
            diagnostic: diag.to_string(),
        };
        assert!(err.to_string().contains(diag));
        assert_eq!(err.class(), "compiler");
    }

    #[test]
    fn filesystem_error_names_the_path() {
        let err = BrokkrError::fs(
            "/out/packages",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/out/packages"));
        assert!(msg.contains("denied"));
    }
}
