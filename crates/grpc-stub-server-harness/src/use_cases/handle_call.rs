//! Call-shape adapters.
//!
//! Each inbound call is driven by exactly one adapter, picked from the
//! method's [`CallShape`]. Adapters decode request messages, record them in
//! the [`Dispatcher`], resolve matchers and turn the synthesized
//! [`Response`]s into header, trailer, message and status operations on the
//! [`ServerCall`].
//!
//! Unary and client-streaming calls answer with the first matching matcher.
//! Server-streaming and bidi-streaming calls let every matching matcher
//! answer the same request unless [`MatchPolicy::FirstMatch`] is configured.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tonic::Status;
use tracing::debug;

use crate::entities::{CallShape, Message, Method, Request, Response};
use crate::use_cases::ports::{MessageCodec, ServerCall};
use crate::use_cases::{Dispatcher, MatchPolicy};

/// A schema method together with the codec for its messages
#[derive(Clone)]
pub struct MethodRoute {
    method: Method,
    codec: Arc<dyn MessageCodec>,
}

impl fmt::Debug for MethodRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRoute")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl MethodRoute {
    pub fn new(method: Method, codec: Arc<dyn MessageCodec>) -> Self {
        Self { method, codec }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Drive one call to completion
    ///
    /// `Ok(())` means the call ends with an OK status.
    pub async fn handle<C>(
        &self,
        dispatcher: &Dispatcher,
        policy: MatchPolicy,
        call: &mut C,
    ) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        match self.method.shape {
            CallShape::Unary => self.unary(dispatcher, call).await,
            CallShape::ServerStreaming => self.server_streaming(dispatcher, policy, call).await,
            CallShape::ClientStreaming => self.client_streaming(dispatcher, call).await,
            CallShape::BidiStreaming => self.bidi_streaming(dispatcher, policy, call).await,
        }
    }

    async fn unary<C>(&self, dispatcher: &Dispatcher, call: &mut C) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        let request = self.recv_single(dispatcher, call).await?;
        let matcher = dispatcher
            .first_match(&request)
            .ok_or_else(|| self.not_found())?;

        let response = matcher.respond(&request);
        emit_metadata(call, &response);
        if let Some(status) = response.error_status() {
            return Err(status.clone());
        }
        let reply = self.encode(response.messages.first())?;
        call.send(reply).await
    }

    async fn server_streaming<C>(
        &self,
        dispatcher: &Dispatcher,
        policy: MatchPolicy,
        call: &mut C,
    ) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        let request = self.recv_single(dispatcher, call).await?;
        let matchers = dispatcher.resolve(&request, policy);
        if matchers.is_empty() {
            return Err(self.not_found());
        }

        for matcher in matchers {
            let response = matcher.respond(&request);
            emit_metadata(call, &response);
            if let Some(status) = response.error_status() {
                return Err(status.clone());
            }
            self.send_all(call, &response).await?;
        }
        Ok(())
    }

    async fn client_streaming<C>(&self, dispatcher: &Dispatcher, call: &mut C) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        let mut received = Vec::new();
        while let Some(bytes) = call.recv().await? {
            received.push(self.record(dispatcher, call, &bytes)?);
        }

        for request in &received {
            let Some(matcher) = dispatcher.first_match(request) else {
                continue;
            };
            let response = matcher.respond(request);
            emit_metadata(call, &response);
            if let Some(status) = response.error_status() {
                return Err(status.clone());
            }
            let reply = self.encode(response.messages.first())?;
            return call.send(reply).await;
        }
        Err(self.not_found())
    }

    async fn bidi_streaming<C>(
        &self,
        dispatcher: &Dispatcher,
        policy: MatchPolicy,
        call: &mut C,
    ) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        let mut header_sent = false;
        while let Some(bytes) = call.recv().await? {
            let request = self.record(dispatcher, call, &bytes)?;
            let matchers = dispatcher.resolve(&request, policy);
            if matchers.is_empty() {
                return Err(self.not_found());
            }

            for matcher in matchers {
                let response = matcher.respond(&request);
                if !header_sent && !response.headers.is_empty() {
                    call.set_header(&response.headers);
                    header_sent = true;
                }
                call.set_trailer(&response.trailers);
                if let Some(status) = response.error_status() {
                    return Err(status.clone());
                }
                self.send_all(call, &response).await?;
            }
        }
        Ok(())
    }

    /// Receive the single request of a unary or server-streaming call
    async fn recv_single<C>(&self, dispatcher: &Dispatcher, call: &mut C) -> Result<Arc<Request>, Status>
    where
        C: ServerCall + ?Sized,
    {
        let bytes = call
            .recv()
            .await?
            .ok_or_else(|| Status::internal("missing request message"))?;
        self.record(dispatcher, call, &bytes)
    }

    /// Decode a request message and append it to the global log
    fn record<C>(&self, dispatcher: &Dispatcher, call: &C, bytes: &[u8]) -> Result<Arc<Request>, Status>
    where
        C: ServerCall + ?Sized,
    {
        let message = self
            .codec
            .decode(bytes)
            .map_err(|e| Status::internal(format!("failed to decode request: {e}")))?;
        let request = Request::new(&self.method, call.request_headers().clone(), message);
        Ok(dispatcher.record(request))
    }

    fn encode(&self, message: Option<&Message>) -> Result<Bytes, Status> {
        let encoded = match message {
            Some(message) => self.codec.encode(message),
            None => self.codec.encode(&Message::new()),
        };
        encoded.map_err(|e| Status::internal(format!("failed to encode response: {e}")))
    }

    async fn send_all<C>(&self, call: &mut C, response: &Response) -> Result<(), Status>
    where
        C: ServerCall + ?Sized,
    {
        for message in &response.messages {
            let reply = self.encode(Some(message))?;
            call.send(reply).await?;
        }
        Ok(())
    }

    fn not_found(&self) -> Status {
        debug!(path = %self.method.path(), "no matcher accepted the request");
        Status::not_found("Not Found")
    }
}

fn emit_metadata<C>(call: &mut C, response: &Response)
where
    C: ServerCall + ?Sized,
{
    if !response.headers.is_empty() && !call.set_header(&response.headers) {
        debug!("response headers already sent, dropping late headers");
    }
    call.set_trailer(&response.trailers);
}
