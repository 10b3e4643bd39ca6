use async_trait::async_trait;
use bytes::Bytes;
use tonic::Status;

use crate::entities::Metadata;

/// One in-flight gRPC call as driven by the RPC runtime
///
/// The call-shape adapters only talk to the runtime through this trait. The
/// terminal status is the adapter's return value; the runtime writes it,
/// together with the accumulated trailers, once the adapter returns.
#[async_trait]
pub trait ServerCall: Send {
    /// Metadata the client sent with the call
    fn request_headers(&self) -> &Metadata;

    /// Next raw request message, or `None` once the client half-closed
    async fn recv(&mut self) -> Result<Option<Bytes>, Status>;

    /// Queue response headers
    ///
    /// Headers go out with the first message or with the terminal status,
    /// whichever comes first. Returns `false` when they were already sent, in
    /// which case `headers` is dropped.
    fn set_header(&mut self, headers: &Metadata) -> bool;

    /// Queue trailers sent alongside the terminal status
    fn set_trailer(&mut self, trailers: &Metadata);

    /// Send one encoded response message
    async fn send(&mut self, message: Bytes) -> Result<(), Status>;
}
