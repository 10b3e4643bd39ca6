use async_trait::async_trait;
use bytes::BytesMut;
use http_body_util::BodyExt;
use hyper::body::{Bytes, Frame, Incoming};
use hyper::header::HeaderMap;
use tokio::sync::{mpsc, oneshot};
use tonic::Status;
use tracing::{debug, warn};

use super::framing::{decode_frame, encode_frame, to_header_map, to_metadata};
use crate::entities::Metadata;
use crate::use_cases::ports::ServerCall;

/// One gRPC call on an HTTP/2 stream
///
/// Response headers are handed to the request future through `head` the
/// first time a message or the final status goes out; everything after that
/// travels as body frames.
pub(super) struct HyperCall {
    request_headers: Metadata,
    body: Incoming,
    inbound: BytesMut,
    inbound_done: bool,
    max_message_size: usize,
    head: Option<oneshot::Sender<HeaderMap>>,
    headers: Metadata,
    trailers: Metadata,
    frames: mpsc::Sender<Frame<Bytes>>,
}

impl HyperCall {
    pub(super) fn new(
        request_headers: &HeaderMap,
        body: Incoming,
        max_message_size: usize,
        head: oneshot::Sender<HeaderMap>,
        frames: mpsc::Sender<Frame<Bytes>>,
    ) -> Self {
        Self {
            request_headers: to_metadata(request_headers),
            body,
            inbound: BytesMut::new(),
            inbound_done: false,
            max_message_size,
            head: Some(head),
            headers: Metadata::new(),
            trailers: Metadata::new(),
            frames,
        }
    }

    /// Write the terminal status together with the accumulated trailers
    pub(super) async fn finish(mut self, result: Result<(), Status>) {
        let status = match result {
            Ok(()) => Status::ok(""),
            Err(status) => {
                debug!(code = ?status.code(), message = status.message(), "call failed");
                status
            }
        };

        self.flush_headers();
        let mut trailers = to_header_map(&self.trailers);
        if let Err(e) = status.add_header(&mut trailers) {
            warn!(error = %e, "failed to encode status trailers");
        }
        // The client may already be gone; nothing left to report to.
        let _ = self.frames.send(Frame::trailers(trailers)).await;
    }

    fn flush_headers(&mut self) {
        if let Some(head) = self.head.take() {
            let _ = head.send(to_header_map(&self.headers));
        }
    }
}

#[async_trait]
impl ServerCall for HyperCall {
    fn request_headers(&self) -> &Metadata {
        &self.request_headers
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, Status> {
        loop {
            if let Some(message) = decode_frame(&mut self.inbound, self.max_message_size)? {
                return Ok(Some(message));
            }
            if self.inbound_done {
                if self.inbound.is_empty() {
                    return Ok(None);
                }
                return Err(Status::internal("request stream ended mid-message"));
            }

            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.inbound.extend_from_slice(&data);
                    }
                }
                Some(Err(e)) => return Err(Status::cancelled(format!("request stream failed: {e}"))),
                None => self.inbound_done = true,
            }
        }
    }

    fn set_header(&mut self, headers: &Metadata) -> bool {
        if self.head.is_none() {
            return false;
        }
        self.headers.extend(headers);
        true
    }

    fn set_trailer(&mut self, trailers: &Metadata) {
        self.trailers.extend(trailers);
    }

    async fn send(&mut self, message: Bytes) -> Result<(), Status> {
        self.flush_headers();
        self.frames
            .send(Frame::data(encode_frame(&message)))
            .await
            .map_err(|_| Status::cancelled("client went away"))
    }
}
