//! Service and package catalog.
//!
//! The schema source set is fixed, so the services and their RPC surfaces are
//! declared in a static table here rather than discovered by parsing proto
//! files at run time. Everything derived from a name (package directory,
//! Python module names, stub file names) is computed in one place so no other
//! module needs globbing or naming conventions of its own.

use heck::ToSnakeCase;

/// Which side of the service a package wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One RPC method of a service, with independent streaming flags per
/// direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMethod {
    /// Proto method name, e.g. `StreamTranscription`.
    pub name: String,
    /// Request message type name.
    pub request: String,
    /// Response message type name.
    pub response: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl RpcMethod {
    pub fn unary(name: &str, request: &str, response: &str) -> Self {
        Self::new(name, request, response, false, false)
    }

    pub fn client_streaming(name: &str, request: &str, response: &str) -> Self {
        Self::new(name, request, response, true, false)
    }

    pub fn server_streaming(name: &str, request: &str, response: &str) -> Self {
        Self::new(name, request, response, false, true)
    }

    pub fn bidi_streaming(name: &str, request: &str, response: &str) -> Self {
        Self::new(name, request, response, true, true)
    }

    fn new(
        name: &str,
        request: &str,
        response: &str,
        client_streaming: bool,
        server_streaming: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            request: request.to_string(),
            response: response.to_string(),
            client_streaming,
            server_streaming,
        }
    }

    /// Python-side wrapper method name (`StreamTranscription` →
    /// `stream_transcription`).
    pub fn python_name(&self) -> String {
        self.name.to_snake_case()
    }
}

/// One gRPC service from the schema source set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Proto service name, e.g. `AudioCloneModelWorker`.
    pub name: String,
    /// Short stem used to derive package names, e.g. `AudioClone`.
    pub stem: String,
    /// Proto file declaring the service, relative to the proto dir.
    pub interface_proto: String,
    /// Message-only protos the interface proto imports, relative to the
    /// proto dir. Compiled alongside the interface so their stubs can be
    /// vendored into each package.
    pub message_protos: Vec<String>,
    pub methods: Vec<RpcMethod>,
}

impl ServiceSpec {
    /// All proto files to hand to the compiler, dependencies first.
    pub fn proto_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.message_protos.iter().map(String::as_str).collect();
        files.push(&self.interface_proto);
        files
    }

    /// Stub module name (sans `.py`) for the interface proto's messages.
    pub fn interface_stub(&self) -> String {
        stub_module_name(&self.interface_proto)
    }

    /// Stub module name (sans `.py`) for the interface proto's gRPC layer.
    pub fn interface_grpc_stub(&self) -> String {
        format!("{}_grpc", stub_module_name(&self.interface_proto))
    }
}

/// Python stub module name protoc derives from a proto file name:
/// `audio-message.proto` → `audio_message_pb2`.
pub fn stub_module_name(proto_file: &str) -> String {
    let stem = proto_file.trim_end_matches(".proto").replace('-', "_");
    format!("{stem}_pb2")
}

/// One generation target: a (service, role) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub service: ServiceSpec,
    pub role: Role,
}

impl PackageSpec {
    pub fn new(service: ServiceSpec, role: Role) -> Self {
        Self { service, role }
    }

    /// Installable package name, e.g. `transcribeclient`. Doubles as the
    /// importable module name, as the original packages do.
    pub fn name(&self) -> String {
        format!("{}{}", self.service.stem.to_lowercase(), self.role)
    }

    /// Human-facing name for READMEs, e.g. `TranscribeClient`.
    pub fn display_name(&self) -> String {
        let role = match self.role {
            Role::Client => "Client",
            Role::Server => "Server",
        };
        format!("{}{}", self.service.stem, role)
    }

    pub fn description(&self) -> String {
        match self.role {
            Role::Client => format!("Python client for the {} gRPC service", self.service.name),
            Role::Server => format!(
                "Python server skeleton for the {} gRPC service",
                self.service.name
            ),
        }
    }

    /// Stub modules this package must contain, in manifest order: message
    /// stubs first, then the interface pair. Service-less `_pb2_grpc` stubs
    /// the compiler also emits are deliberately absent; nothing imports them.
    pub fn vendored_stub_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .service
            .message_protos
            .iter()
            .map(|p| stub_module_name(p))
            .collect();
        modules.push(self.service.interface_stub());
        modules.push(self.service.interface_grpc_stub());
        modules
    }

    /// Every stub module the compiler emits for this package's protos,
    /// vendored or not. Imports of any of these must be accounted for during
    /// assembly: vendored ones get rewritten, the rest are an error.
    pub fn raw_stub_modules(&self) -> Vec<String> {
        let mut modules = Vec::new();
        for proto in self.service.proto_files() {
            let stub = stub_module_name(proto);
            modules.push(format!("{stub}_grpc"));
            modules.push(stub);
        }
        modules
    }

    /// File name of the hand-authored wrapper module.
    pub fn wrapper_file(&self) -> &'static str {
        match self.role {
            Role::Client => "client.py",
            Role::Server => "server.py",
        }
    }
}

/// The two model-worker services of the schema source set.
pub fn builtin_services() -> Vec<ServiceSpec> {
    vec![
        ServiceSpec {
            name: "TranscribeWorker".to_string(),
            stem: "Transcribe".to_string(),
            interface_proto: "transcribe-interface.proto".to_string(),
            message_protos: vec!["audio-message.proto".to_string()],
            methods: vec![
                RpcMethod::unary("Transcribe", "TranscribeRequest", "TranscribeResponse"),
                RpcMethod::bidi_streaming(
                    "StreamTranscription",
                    "TranscribeRequest",
                    "TranscribeResponse",
                ),
            ],
        },
        ServiceSpec {
            name: "AudioCloneModelWorker".to_string(),
            stem: "AudioClone".to_string(),
            interface_proto: "clone-interface.proto".to_string(),
            message_protos: vec!["audio-message.proto".to_string()],
            methods: vec![
                RpcMethod::unary("CloneVoice", "CloneVoiceRequest", "CloneVoiceResponse"),
                RpcMethod::server_streaming("SynthesizeStream", "CloneVoiceRequest", "AudioMessage"),
                RpcMethod::client_streaming(
                    "UploadReference",
                    "AudioMessage",
                    "UploadReferenceResponse",
                ),
            ],
        },
    ]
}

/// All generation targets: client and server for every built-in service.
/// Package names are unique by construction; `debug_assert`ed anyway since
/// the whole output layout depends on it.
pub fn catalog() -> Vec<PackageSpec> {
    let mut specs = Vec::new();
    for service in builtin_services() {
        specs.push(PackageSpec::new(service.clone(), Role::Client));
        specs.push(PackageSpec::new(service, Role::Server));
    }

    debug_assert!(
        {
            let mut names: Vec<String> = specs.iter().map(PackageSpec::name).collect();
            names.sort();
            names.windows(2).all(|w| w[0] != w[1])
        },
        "package names must be unique"
    );

    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_names_follow_protoc_convention() {
        assert_eq!(stub_module_name("audio-message.proto"), "audio_message_pb2");
        assert_eq!(
            stub_module_name("transcribe-interface.proto"),
            "transcribe_interface_pb2"
        );
    }

    #[test]
    fn package_names_are_lowercase_stem_plus_role() {
        let specs = catalog();
        let names: Vec<String> = specs.iter().map(PackageSpec::name).collect();
        assert_eq!(
            names,
            vec![
                "transcribeclient",
                "transcribeserver",
                "audiocloneclient",
                "audiocloneserver",
            ]
        );
    }

    #[test]
    fn python_method_names_are_snake_case() {
        let m = RpcMethod::bidi_streaming("StreamTranscription", "Req", "Resp");
        assert_eq!(m.python_name(), "stream_transcription");
    }

    #[test]
    fn vendored_modules_exclude_serviceless_grpc_stub() {
        let spec = catalog().remove(0);
        let vendored = spec.vendored_stub_modules();
        assert_eq!(
            vendored,
            vec![
                "audio_message_pb2",
                "transcribe_interface_pb2",
                "transcribe_interface_pb2_grpc",
            ]
        );
        // the compiler also emits this one, but no package ships it
        assert!(spec.raw_stub_modules().contains(&"audio_message_pb2_grpc".to_string()));
    }

    #[test]
    fn proto_files_list_dependencies_first() {
        let service = &builtin_services()[0];
        assert_eq!(
            service.proto_files(),
            vec!["audio-message.proto", "transcribe-interface.proto"]
        );
    }
}
