//! `client.py` generation.
//!
//! The wrapper hides channel and stub plumbing behind one class per service.
//! Connection lifetime is scoped: `connect()` opens, `close()` closes, and
//! the context-manager protocol ties release to scope exit even when the
//! body raises. Every RPC becomes one `snake_case` method; streaming
//! directions stay lazy (iterables in, iterators out), nothing is buffered.

use crate::catalog::{PackageSpec, RpcMethod};

use super::{module_header, stub_import};

pub fn generate(spec: &PackageSpec) -> String {
    let package = spec.name();
    let service = &spec.service;
    let class = format!("{}Client", service.name);
    let grpc_stub = service.interface_grpc_stub();

    let mut out = String::new();
    out.push_str(&module_header(
        spec,
        &format!("Python client for the {} gRPC service.", service.name),
    ));
    out.push('\n');
    out.push_str("import grpc\n\n");
    out.push_str(&stub_import(&package, &grpc_stub));
    out.push_str("\n\n");

    out.push_str(&format!("class {class}:\n"));
    out.push_str(&format!(
        "    \"\"\"Scoped wrapper around the generated {} stub.\n",
        service.name
    ));
    out.push('\n');
    out.push_str("    Opens its channel in connect() (or on entering a with block) and\n");
    out.push_str("    closes it in close() (or on leaving the block, error or not):\n");
    out.push('\n');
    out.push_str(&format!(
        "        with {class}(\"localhost:50051\") as client:\n"
    ));
    out.push_str(&format!(
        "            response = client.{}(request)\n",
        example_method(service.methods.first())
    ));
    out.push_str("    \"\"\"\n\n");

    out.push_str("    def __init__(self, target, credentials=None):\n");
    out.push_str("        self._target = target\n");
    out.push_str("        self._credentials = credentials\n");
    out.push_str("        self._channel = None\n");
    out.push_str("        self._stub = None\n\n");

    out.push_str("    def connect(self):\n");
    out.push_str("        \"\"\"Open the channel and build the stub. Returns self.\"\"\"\n");
    out.push_str("        if self._channel is not None:\n");
    out.push_str("            return self\n");
    out.push_str("        if self._credentials is None:\n");
    out.push_str("            self._channel = grpc.insecure_channel(self._target)\n");
    out.push_str("        else:\n");
    out.push_str("            self._channel = grpc.secure_channel(self._target, self._credentials)\n");
    out.push_str(&format!(
        "        self._stub = {grpc_stub}.{}Stub(self._channel)\n",
        service.name
    ));
    out.push_str("        return self\n\n");

    out.push_str("    def close(self):\n");
    out.push_str("        \"\"\"Close the channel. Safe to call more than once.\"\"\"\n");
    out.push_str("        if self._channel is not None:\n");
    out.push_str("            self._channel.close()\n");
    out.push_str("            self._channel = None\n");
    out.push_str("            self._stub = None\n\n");

    out.push_str("    def __enter__(self):\n");
    out.push_str("        return self.connect()\n\n");
    out.push_str("    def __exit__(self, exc_type, exc_value, traceback):\n");
    out.push_str("        self.close()\n");
    out.push_str("        return False\n\n");

    out.push_str("    def _stub_or_raise(self):\n");
    out.push_str("        if self._stub is None:\n");
    out.push_str(
        "            raise RuntimeError(\"client is not connected; call connect() or use a with block\")\n",
    );
    out.push_str("        return self._stub\n");

    for method in &service.methods {
        out.push('\n');
        out.push_str(&method_block(method));
    }

    out
}

/// One wrapper method. The parameter shape follows the client-side streaming
/// flag: a single message, or an iterable that is handed to the stub as an
/// iterator without being collected.
fn method_block(method: &RpcMethod) -> String {
    let (param, arg) = if method.client_streaming {
        ("requests", "iter(requests)")
    } else {
        ("request", "request")
    };
    let req_side = if method.client_streaming {
        format!("iterable of {}", method.request)
    } else {
        format!("one {}", method.request)
    };
    let resp_side = if method.server_streaming {
        format!("iterator of {}", method.response)
    } else {
        format!("one {}", method.response)
    };

    let mut out = String::new();
    out.push_str(&format!(
        "    def {}(self, {param}, timeout=None):\n",
        method.python_name()
    ));
    out.push_str(&format!(
        "        \"\"\"{}: {req_side} in, {resp_side} back.\"\"\"\n",
        method.name
    ));
    out.push_str(&format!(
        "        return self._stub_or_raise().{}({arg}, timeout=timeout)\n",
        method.name
    ));
    out
}

/// Method name used in the class docstring example.
fn example_method(method: Option<&RpcMethod>) -> String {
    method.map(RpcMethod::python_name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;

    fn transcribe_client() -> String {
        generate(&catalog()[0])
    }

    #[test]
    fn wrapper_has_scoped_lifecycle() {
        let code = transcribe_client();
        for needle in [
            "def connect(self):",
            "def close(self):",
            "def __enter__(self):",
            "def __exit__(self, exc_type, exc_value, traceback):",
        ] {
            assert!(code.contains(needle), "missing {needle:?}");
        }
        // release must run on the error path too
        assert!(code.contains("self.close()\n        return False"));
    }

    #[test]
    fn stub_import_is_package_absolute() {
        let code = transcribe_client();
        assert!(code.contains(
            "import transcribeclient.transcribe_interface_pb2_grpc as transcribe_interface_pb2_grpc"
        ));
        assert!(!code.contains("\nimport transcribe_interface_pb2_grpc"));
    }

    #[test]
    fn every_rpc_gets_one_snake_case_method() {
        let code = transcribe_client();
        assert!(code.contains("def transcribe(self, request, timeout=None):"));
        assert!(code.contains("def stream_transcription(self, requests, timeout=None):"));
        assert_eq!(code.matches("def transcribe(").count(), 1);
    }

    #[test]
    fn streaming_inputs_stay_lazy() {
        let code = generate(&catalog()[2]);
        // client-streaming upload passes the iterable through as an iterator
        assert!(code.contains(".UploadReference(iter(requests), timeout=timeout)"));
        // unary call passes the message straight through
        assert!(code.contains(".CloneVoice(request, timeout=timeout)"));
        // server-streaming result is returned, not collected
        assert!(code.contains("return self._stub_or_raise().SynthesizeStream(request"));
        assert!(!code.contains("list("));
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(transcribe_client(), transcribe_client());
    }
}
