//! `server.py` generation.
//!
//! Two artifacts per server package: a skeleton servicer whose methods all
//! answer UNIMPLEMENTED (and raise, so a subclass that forgets an override
//! hears about it loudly), and a blocking `serve()` entry point that binds
//! the servicer, installs SIGTERM/SIGINT handlers for graceful stop, and
//! waits for termination.

use crate::catalog::{PackageSpec, RpcMethod};

use super::{module_header, stub_import};

pub fn generate(spec: &PackageSpec) -> String {
    let package = spec.name();
    let service = &spec.service;
    let class = format!("{}Servicer", service.name);
    let grpc_stub = service.interface_grpc_stub();

    let mut out = String::new();
    out.push_str(&module_header(
        spec,
        &format!("Python server skeleton for the {} gRPC service.", service.name),
    ));
    out.push('\n');
    out.push_str("import signal\n");
    out.push_str("from concurrent import futures\n\n");
    out.push_str("import grpc\n\n");
    out.push_str(&stub_import(&package, &grpc_stub));
    out.push_str("\n\n");

    out.push_str(&format!("class {class}({grpc_stub}.{class}):\n"));
    out.push_str(
        "    \"\"\"Skeleton servicer. Subclass it and override each RPC you implement.\"\"\"\n",
    );

    for method in &service.methods {
        out.push('\n');
        out.push_str(&method_block(method));
    }

    out.push_str("\n\n");
    out.push_str("def serve(port=50051, servicer=None, max_workers=10):\n");
    out.push_str("    \"\"\"Serve `servicer` (the skeleton when None) on `port` until terminated.\n");
    out.push('\n');
    out.push_str("    Blocks the calling thread. SIGTERM and SIGINT both trigger a graceful\n");
    out.push_str("    stop with a short drain window.\n");
    out.push_str("    \"\"\"\n");
    out.push_str("    server = grpc.server(futures.ThreadPoolExecutor(max_workers=max_workers))\n");
    out.push_str(&format!(
        "    {grpc_stub}.add_{class}_to_server(\n"
    ));
    out.push_str(&format!(
        "        servicer if servicer is not None else {class}(), server\n"
    ));
    out.push_str("    )\n");
    out.push_str("    server.add_insecure_port(f\"[::]:{port}\")\n");
    out.push_str("    server.start()\n\n");
    out.push_str("    def _stop(signum, frame):\n");
    out.push_str("        server.stop(grace=5.0)\n\n");
    out.push_str("    signal.signal(signal.SIGTERM, _stop)\n");
    out.push_str("    signal.signal(signal.SIGINT, _stop)\n");
    out.push_str("    server.wait_for_termination()\n");

    out.push_str("\n\n");
    out.push_str("if __name__ == \"__main__\":\n");
    out.push_str("    serve()\n");

    out
}

/// One skeleton method, named exactly as the generated base class expects so
/// overriding works. Signals UNIMPLEMENTED on the wire and raises locally.
fn method_block(method: &RpcMethod) -> String {
    let param = if method.client_streaming {
        "request_iterator"
    } else {
        "request"
    };
    let req_side = if method.client_streaming {
        format!("iterator of {}", method.request)
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
        "    def {}(self, {param}, context):\n",
        method.name
    ));
    out.push_str(&format!(
        "        \"\"\"{}: {req_side} in, {resp_side} back.\"\"\"\n",
        method.name
    ));
    out.push_str("        context.set_code(grpc.StatusCode.UNIMPLEMENTED)\n");
    out.push_str(&format!(
        "        context.set_details(\"{} is not implemented\")\n",
        method.name
    ));
    out.push_str(&format!(
        "        raise NotImplementedError(\"{} is not implemented\")\n",
        method.name
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog;

    fn transcribe_server() -> String {
        generate(&catalog()[1])
    }

    #[test]
    fn skeleton_subclasses_generated_servicer() {
        let code = transcribe_server();
        assert!(code.contains(
            "class TranscribeWorkerServicer(transcribe_interface_pb2_grpc.TranscribeWorkerServicer):"
        ));
    }

    #[test]
    fn every_rpc_signals_unimplemented() {
        let code = transcribe_server();
        for method in ["Transcribe", "StreamTranscription"] {
            assert!(code.contains(&format!("def {method}(self, ")), "missing {method}");
            assert!(code.contains(&format!("raise NotImplementedError(\"{method} is not implemented\")")));
        }
        assert_eq!(code.matches("grpc.StatusCode.UNIMPLEMENTED").count(), 2);
    }

    #[test]
    fn serve_signature_and_shutdown_hooks() {
        let code = transcribe_server();
        assert!(code.contains("def serve(port=50051, servicer=None, max_workers=10):"));
        assert!(code.contains("signal.signal(signal.SIGTERM, _stop)"));
        assert!(code.contains("signal.signal(signal.SIGINT, _stop)"));
        assert!(code.contains("server.wait_for_termination()"));
        assert!(code.contains("if __name__ == \"__main__\":"));
    }

    #[test]
    fn client_streaming_methods_take_an_iterator() {
        let code = generate(&catalog()[3]);
        assert!(code.contains("def UploadReference(self, request_iterator, context):"));
        assert!(code.contains("def CloneVoice(self, request, context):"));
    }

    #[test]
    fn binds_default_servicer_when_none_given() {
        let code = transcribe_server();
        assert!(code.contains("add_TranscribeWorkerServicer_to_server"));
        assert!(code.contains("servicer if servicer is not None else TranscribeWorkerServicer()"));
    }
}
