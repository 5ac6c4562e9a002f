//! `README.md` generation.
//!
//! Each package ships a README whose usage snippet is built from the same
//! catalog the wrappers are, so the documented calls always exist: the
//! unary example uses the first non-streaming RPC, the streaming example
//! the first response-streaming RPC.

use crate::catalog::{PackageSpec, Role, RpcMethod, ServiceSpec};

use super::manifest::REQUIRES_PYTHON;

pub fn generate(spec: &PackageSpec) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", spec.display_name()));
    out.push_str(&format!("{}.\n\n", spec.description()));
    out.push_str(
        "Self-contained: the protobuf stubs are vendored inside the package, so the\n\
         only runtime requirements are the gRPC and protobuf runtimes.\n\n",
    );

    out.push_str("## Install\n\n");
    out.push_str(&format!("Requires Python {REQUIRES_PYTHON}.\n\n"));
    out.push_str("```bash\n");
    out.push_str(&format!("pip install ./{}\n", spec.name()));
    out.push_str("```\n\n");

    out.push_str("## Usage\n\n");
    match spec.role {
        Role::Client => out.push_str(&client_usage(spec)),
        Role::Server => out.push_str(&server_usage(spec)),
    }

    out
}

/// First RPC with no streaming on either side, falling back to whatever
/// comes first.
fn unary_example(service: &ServiceSpec) -> Option<&RpcMethod> {
    service
        .methods
        .iter()
        .find(|m| !m.client_streaming && !m.server_streaming)
        .or_else(|| service.methods.first())
}

/// First response-streaming RPC, preferring one that is not also
/// request-streaming so the snippet stays a one-liner.
fn streaming_example(service: &ServiceSpec) -> Option<&RpcMethod> {
    service
        .methods
        .iter()
        .find(|m| m.server_streaming && !m.client_streaming)
        .or_else(|| service.methods.iter().find(|m| m.server_streaming))
}

fn client_usage(spec: &PackageSpec) -> String {
    let package = spec.name();
    let service = &spec.service;
    let class = format!("{}Client", service.name);
    let pb2 = service.interface_stub();

    let mut out = String::new();
    out.push_str("```python\n");
    out.push_str(&format!("from {package} import {class}\n"));
    out.push_str(&format!("from {package} import {pb2}\n\n"));
    out.push_str(&format!("with {class}(\"localhost:50051\") as client:\n"));

    if let Some(method) = unary_example(service) {
        out.push_str(&format!("    request = {pb2}.{}()\n", method.request));
        if method.client_streaming {
            out.push_str(&format!(
                "    response = client.{}(iter([request]))\n",
                method.python_name()
            ));
        } else {
            out.push_str(&format!(
                "    response = client.{}(request)\n",
                method.python_name()
            ));
        }
    }

    if let Some(method) = streaming_example(service) {
        let arg = if method.client_streaming {
            format!("iter([{pb2}.{}()])", method.request)
        } else {
            format!("{pb2}.{}()", method.request)
        };
        out.push('\n');
        out.push_str(&format!(
            "    for update in client.{}({arg}):\n",
            method.python_name()
        ));
        out.push_str("        print(update)\n");
    }

    out.push_str("```\n");
    out
}

fn server_usage(spec: &PackageSpec) -> String {
    let package = spec.name();
    let service = &spec.service;
    let class = format!("{}Servicer", service.name);

    let mut out = String::new();
    out.push_str("Subclass the skeleton, override the RPCs you implement, and hand it to\n");
    out.push_str("`serve()`:\n\n");
    out.push_str("```python\n");
    out.push_str(&format!("from {package} import {class}, serve\n\n\n"));
    out.push_str(&format!("class My{}({class}):\n", service.name));
    if let Some(method) = unary_example(service) {
        let param = if method.client_streaming {
            "request_iterator"
        } else {
            "request"
        };
        out.push_str(&format!("    def {}(self, {param}, context):\n", method.name));
        out.push_str("        ...\n");
    } else {
        out.push_str("    pass\n");
    }
    out.push_str("\n\n");
    out.push_str(&format!("serve(port=50051, servicer=My{}())\n", service.name));
    out.push_str("```\n\n");
    out.push_str("`serve()` blocks until SIGTERM or SIGINT.\n");
    out
}
