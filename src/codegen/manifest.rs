//! `pyproject.toml` synthesis.
//!
//! The manifest is modeled as serde structs rather than a text template so
//! the same [`PyProject`] type serves both sides: synthesis serializes it,
//! validation deserializes what landed on disk and checks it field by field.
//! Unknown keys are tolerated on the way in, so a hand-extended manifest
//! still parses.

use serde::{Deserialize, Serialize};

use crate::catalog::PackageSpec;
use crate::compiler::{GRPCIO_FLOOR, PROTOBUF_FLOOR};
use crate::error::Result;

/// PEP 517 backend used by every generated package.
pub const BUILD_BACKEND: &str = "hatchling.build";

/// Python floor; matches the oldest runtime the gRPC floor still supports.
pub const REQUIRES_PYTHON: &str = ">=3.9";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyProject {
    #[serde(rename = "build-system")]
    pub build_system: BuildSystem,
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSystem {
    pub requires: Vec<String>,
    #[serde(rename = "build-backend")]
    pub build_backend: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub version: String,
    pub description: String,
    pub readme: String,
    #[serde(rename = "requires-python")]
    pub requires_python: String,
    pub dependencies: Vec<String>,
}

/// Runtime requirements of a generated package: the gRPC and protobuf
/// runtimes only, both as floors. The stub toolchain itself is never a
/// runtime dependency, and nothing is pinned; consumers resolve versions.
pub fn runtime_dependencies() -> Vec<String> {
    vec![
        format!("grpcio>={GRPCIO_FLOOR}"),
        format!("protobuf>={PROTOBUF_FLOOR}"),
    ]
}

pub fn synthesize(spec: &PackageSpec, version: &str) -> PyProject {
    PyProject {
        build_system: BuildSystem {
            requires: vec!["hatchling".to_string()],
            build_backend: BUILD_BACKEND.to_string(),
        },
        project: Project {
            name: spec.name(),
            version: version.to_string(),
            description: spec.description(),
            readme: "README.md".to_string(),
            requires_python: REQUIRES_PYTHON.to_string(),
            dependencies: runtime_dependencies(),
        },
    }
}

pub fn render(spec: &PackageSpec, version: &str) -> Result<String> {
    Ok(toml::to_string_pretty(&synthesize(spec, version))?)
}

/// Distribution name of a PEP 508 requirement string:
/// `grpcio>=1.50.0` → `grpcio`.
pub fn requirement_name(requirement: &str) -> &str {
    let requirement = requirement.trim_start();
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(requirement.len());
    &requirement[..end]
}

/// Import roots a distribution provides. Distribution names and importable
/// module names rarely match in this ecosystem, so the mapping is explicit.
const DIST_IMPORT_ROOTS: &[(&str, &[&str])] = &[
    ("grpcio", &["grpc"]),
    ("protobuf", &["google"]),
];

pub fn import_roots(distribution: &str) -> &'static [&'static str] {
    DIST_IMPORT_ROOTS
        .iter()
        .find(|(name, _)| *name == distribution)
        .map(|(_, roots)| *roots)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;

    #[test]
    fn rendered_manifest_parses_back_intact() {
        let spec = &catalog()[0];
        let text = render(spec, "1.2.3").unwrap();
        let parsed: PyProject = toml::from_str(&text).unwrap();
        assert_eq!(parsed, synthesize(spec, "1.2.3"));
        assert_eq!(parsed.project.name, "transcribeclient");
        assert_eq!(parsed.project.version, "1.2.3");
        assert_eq!(parsed.project.readme, "README.md");
    }

    #[test]
    fn dependencies_are_floors_not_pins() {
        let deps = runtime_dependencies();
        assert_eq!(deps, vec!["grpcio>=1.50.0", "protobuf>=4.25.0"]);
        for dep in &deps {
            assert!(!dep.contains("=="), "pinned dependency: {dep}");
        }
    }

    #[test]
    fn toolchain_is_not_a_runtime_dependency() {
        let text = render(&catalog()[1], "0.1.0").unwrap();
        assert!(!text.contains("grpcio-tools"));
    }

    #[test]
    fn requirement_names_strip_version_constraints() {
        assert_eq!(requirement_name("grpcio>=1.50.0"), "grpcio");
        assert_eq!(requirement_name("protobuf"), "protobuf");
        assert_eq!(requirement_name("foo-bar ~= 2.0"), "foo-bar");
    }

    #[test]
    fn import_roots_cover_both_runtimes() {
        assert_eq!(import_roots("grpcio"), ["grpc"]);
        assert_eq!(import_roots("protobuf"), ["google"]);
        assert!(import_roots("left-pad").is_empty());
    }

    #[test]
    fn manifest_tolerates_unknown_keys_when_parsing() {
        let text = "\
[build-system]\nrequires = [\"hatchling\"]\nbuild-backend = \"hatchling.build\"\n\n\
[project]\nname = \"x\"\nversion = \"0.1.0\"\ndescription = \"d\"\nreadme = \"README.md\"\n\
requires-python = \">=3.9\"\ndependencies = []\nlicense = \"MIT\"\n";
        let parsed: PyProject = toml::from_str(text).unwrap();
        assert_eq!(parsed.project.name, "x");
    }
}
