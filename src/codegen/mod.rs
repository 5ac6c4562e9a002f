//! Python source and metadata synthesis.
//!
//! Everything here is a pure function of a [`PackageSpec`] (plus a version
//! string where relevant) to text. Nothing touches the filesystem, which is
//! what makes byte-for-byte idempotence across runs trivial to guarantee:
//! same spec in, same bytes out, no timestamps, no environment reads.
//!
//! One generator per artifact:
//! - [`client::generate`]: `client.py`, the scoped-acquisition wrapper
//! - [`server::generate`]: `server.py`, the servicer skeleton + `serve()`
//! - [`manifest`]: `pyproject.toml` via typed serde structs
//! - [`readme::generate`]: `README.md` with a role-matched usage snippet
//! - [`generate_init`]: the package `__init__.py` exports

pub mod client;
pub mod manifest;
pub mod readme;
pub mod server;

use crate::catalog::{PackageSpec, Role};
use crate::error::Result;

/// Every synthesized text artifact for one package, rendered up front so a
/// dry run can exercise synthesis without touching the filesystem.
#[derive(Debug, Clone)]
pub struct RenderedPackage {
    pub manifest: String,
    pub readme: String,
    pub init: String,
    pub wrapper: String,
}

pub fn render_package(spec: &PackageSpec, version: &str) -> Result<RenderedPackage> {
    Ok(RenderedPackage {
        manifest: manifest::render(spec, version)?,
        readme: readme::generate(spec),
        init: generate_init(spec),
        wrapper: match spec.role {
            Role::Client => client::generate(spec),
            Role::Server => server::generate(spec),
        },
    })
}

/// Header docstring shared by all generated wrapper modules.
pub(crate) fn module_header(spec: &PackageSpec, summary: &str) -> String {
    format!(
        "\"\"\"{summary}\n\nGenerated by brokkr from {proto}; do not edit by hand.\n\"\"\"\n",
        proto = spec.service.interface_proto,
    )
}

/// Package-absolute import of a vendored stub module, aliased to the bare
/// name the rest of the generated code uses.
pub(crate) fn stub_import(package: &str, module: &str) -> String {
    format!("import {package}.{module} as {module}\n")
}

/// The `__init__.py` for a package: docstring plus re-exports of the
/// wrapper's public names.
pub fn generate_init(spec: &PackageSpec) -> String {
    let package = spec.name();
    let mut out = String::new();

    out.push_str(&format!(
        "\"\"\"{package}: {description}.\"\"\"\n\n",
        description = spec.description(),
    ));

    match spec.role {
        Role::Client => {
            let class = format!("{}Client", spec.service.name);
            out.push_str(&format!("from {package}.client import {class}\n\n"));
            out.push_str(&format!("__all__ = [\"{class}\"]\n"));
        }
        Role::Server => {
            let class = format!("{}Servicer", spec.service.name);
            out.push_str(&format!("from {package}.server import {class}, serve\n\n"));
            out.push_str(&format!("__all__ = [\"{class}\", \"serve\"]\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;

    #[test]
    fn init_exports_match_role() {
        let specs = catalog();

        let client_init = generate_init(&specs[0]);
        assert!(client_init.contains("from transcribeclient.client import TranscribeWorkerClient"));
        assert!(client_init.contains("__all__ = [\"TranscribeWorkerClient\"]"));

        let server_init = generate_init(&specs[1]);
        assert!(
            server_init.contains("from transcribeserver.server import TranscribeWorkerServicer, serve")
        );
        assert!(server_init.contains("\"serve\""));
    }

    #[test]
    fn generated_text_is_idempotent() {
        let spec = &catalog()[0];
        assert_eq!(generate_init(spec), generate_init(spec));
    }

    #[test]
    fn rendered_package_picks_the_wrapper_for_the_role() {
        let specs = catalog();
        let client = render_package(&specs[0], "0.1.0").unwrap();
        assert!(client.wrapper.contains("class TranscribeWorkerClient:"));
        let server = render_package(&specs[1], "0.1.0").unwrap();
        assert!(server.wrapper.contains("def serve("));
        assert!(server.manifest.contains("transcribeserver"));
    }
}
