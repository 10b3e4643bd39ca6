use std::collections::{BTreeSet, HashSet, VecDeque};

use bytes::Bytes;
use prost::Message;
use prost_reflect::{DescriptorPool, FileDescriptor};
use tonic::Status;
use tracing::debug;

use crate::use_cases::ports::ServerCall;

pub(super) const REFLECTION_PATH: &str = "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo";
pub(super) const REFLECTION_V1ALPHA_PATH: &str =
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo";

#[derive(Clone, PartialEq, Message)]
pub(super) struct ServerReflectionRequest {
    #[prost(string, tag = "1")]
    pub host: String,
    #[prost(oneof = "MessageRequest", tags = "3, 4, 5, 6, 7")]
    pub message_request: Option<MessageRequest>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub(super) enum MessageRequest {
    #[prost(string, tag = "3")]
    FileByFilename(String),
    #[prost(string, tag = "4")]
    FileContainingSymbol(String),
    #[prost(message, tag = "5")]
    FileContainingExtension(ExtensionRequest),
    #[prost(string, tag = "6")]
    AllExtensionNumbersOfType(String),
    #[prost(string, tag = "7")]
    ListServices(String),
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct ExtensionRequest {
    #[prost(string, tag = "1")]
    pub containing_type: String,
    #[prost(int32, tag = "2")]
    pub extension_number: i32,
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct ServerReflectionResponse {
    #[prost(string, tag = "1")]
    pub valid_host: String,
    #[prost(message, optional, tag = "2")]
    pub original_request: Option<ServerReflectionRequest>,
    #[prost(oneof = "MessageResponse", tags = "4, 5, 6, 7")]
    pub message_response: Option<MessageResponse>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub(super) enum MessageResponse {
    #[prost(message, tag = "4")]
    FileDescriptorResponse(FileDescriptorResponse),
    #[prost(message, tag = "5")]
    AllExtensionNumbersResponse(ExtensionNumberResponse),
    #[prost(message, tag = "6")]
    ListServicesResponse(ListServiceResponse),
    #[prost(message, tag = "7")]
    ErrorResponse(ErrorResponse),
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct FileDescriptorResponse {
    /// Encoded `FileDescriptorProto`s
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub file_descriptor_proto: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct ExtensionNumberResponse {
    #[prost(string, tag = "1")]
    pub base_type_name: String,
    #[prost(int32, repeated, tag = "2")]
    pub extension_number: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct ListServiceResponse {
    #[prost(message, repeated, tag = "1")]
    pub service: Vec<ServiceResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct ServiceResponse {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub(super) struct ErrorResponse {
    #[prost(int32, tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

/// Answers `grpc.reflection.v1.ServerReflection/ServerReflectionInfo`
///
/// `v1alpha` shares the wire format and is served by the same code. Lookups
/// search the pools in order. A file is sent at most once per stream, except
/// for the file a request asked for, which is always sent first.
pub(super) struct ReflectionService {
    pools: Vec<DescriptorPool>,
}

impl ReflectionService {
    pub(super) fn new(pools: Vec<DescriptorPool>) -> Self {
        Self { pools }
    }

    pub(super) async fn serve<C>(&self, call: &mut C) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        let mut sent = HashSet::new();
        while let Some(bytes) = call.recv().await? {
            let request = ServerReflectionRequest::decode(bytes)
                .map_err(|e| Status::invalid_argument(format!("failed to decode request: {e}")))?;
            let response = self.answer(request, &mut sent);
            call.send(Bytes::from(response.encode_to_vec())).await?;
        }
        Ok(())
    }

    fn answer(&self, request: ServerReflectionRequest, sent: &mut HashSet<String>) -> ServerReflectionResponse {
        let answered = match &request.message_request {
            Some(MessageRequest::FileByFilename(name)) => self
                .find(|pool| pool.get_file_by_name(name))
                .ok_or_else(|| Status::not_found(format!("file {name:?} not found")))
                .map(|file| with_dependencies(file, sent)),
            Some(MessageRequest::FileContainingSymbol(symbol)) => self
                .find(|pool| file_containing_symbol(pool, symbol))
                .ok_or_else(|| Status::not_found(format!("symbol {symbol:?} not found")))
                .map(|file| with_dependencies(file, sent)),
            Some(MessageRequest::FileContainingExtension(extension)) => self
                .find(|pool| {
                    let number = u32::try_from(extension.extension_number).ok()?;
                    let extendee = pool.get_message_by_name(&extension.containing_type)?;
                    extendee.get_extension(number).map(|x| x.parent_file())
                })
                .ok_or_else(|| {
                    Status::not_found(format!(
                        "extension {} of {:?} not found",
                        extension.extension_number, extension.containing_type
                    ))
                })
                .map(|file| with_dependencies(file, sent)),
            Some(MessageRequest::AllExtensionNumbersOfType(name)) => self
                .find(|pool| pool.get_message_by_name(name))
                .ok_or_else(|| Status::not_found(format!("type {name:?} not found")))
                .map(|message| {
                    MessageResponse::AllExtensionNumbersResponse(ExtensionNumberResponse {
                        base_type_name: message.full_name().to_string(),
                        extension_number: message.extensions().map(|x| x.number() as i32).collect(),
                    })
                }),
            Some(MessageRequest::ListServices(_)) => Ok(self.list_services()),
            None => Err(Status::invalid_argument("empty reflection request")),
        };

        let message_response = answered.unwrap_or_else(|status| {
            debug!(code = ?status.code(), message = status.message(), "reflection lookup failed");
            MessageResponse::ErrorResponse(ErrorResponse {
                error_code: status.code() as i32,
                error_message: status.message().to_string(),
            })
        });

        ServerReflectionResponse {
            valid_host: request.host.clone(),
            original_request: Some(request),
            message_response: Some(message_response),
        }
    }

    fn find<T>(&self, lookup: impl Fn(&DescriptorPool) -> Option<T>) -> Option<T> {
        self.pools.iter().find_map(lookup)
    }

    fn list_services(&self) -> MessageResponse {
        let names: BTreeSet<String> = self
            .pools
            .iter()
            .flat_map(|pool| pool.services().map(|s| s.full_name().to_string()).collect::<Vec<_>>())
            .collect();
        MessageResponse::ListServicesResponse(ListServiceResponse {
            service: names.into_iter().map(|name| ServiceResponse { name }).collect(),
        })
    }
}

/// Types, services and extensions resolve directly; methods and fields
/// through their parent
fn file_containing_symbol(pool: &DescriptorPool, symbol: &str) -> Option<FileDescriptor> {
    let direct = pool
        .get_message_by_name(symbol)
        .map(|m| m.parent_file())
        .or_else(|| pool.get_enum_by_name(symbol).map(|e| e.parent_file()))
        .or_else(|| pool.get_service_by_name(symbol).map(|s| s.parent_file()))
        .or_else(|| pool.get_extension_by_name(symbol).map(|x| x.parent_file()));
    if direct.is_some() {
        return direct;
    }

    let (parent, member) = symbol.rsplit_once('.')?;
    if let Some(service) = pool.get_service_by_name(parent) {
        if service.methods().any(|m| m.name() == member) {
            return Some(service.parent_file());
        }
    }
    let message = pool.get_message_by_name(parent)?;
    message.get_field_by_name(member).map(|_| message.parent_file())
}

/// `file` followed by its transitive imports not yet sent on this stream
fn with_dependencies(file: FileDescriptor, sent: &mut HashSet<String>) -> MessageResponse {
    let mut encoded = Vec::new();
    let mut queue = VecDeque::from([file]);
    while let Some(current) = queue.pop_front() {
        let fresh = sent.insert(current.name().to_string());
        if encoded.is_empty() || fresh {
            encoded.push(current.file_descriptor_proto().encode_to_vec());
            queue.extend(current.dependencies());
        }
    }
    MessageResponse::FileDescriptorResponse(FileDescriptorResponse {
        file_descriptor_proto: encoded,
    })
}
