use tonic::{Code, Status};

use super::{Message, Metadata};

/// A synthesized gRPC response
///
/// Non-streaming calls only use the first message (or an empty document when
/// there is none). A `status` with a non-OK code ends the call with that
/// status instead of sending any message.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub headers: Metadata,
    pub trailers: Metadata,
    pub messages: Vec<Message>,
    pub status: Option<Status>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn with_trailer(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.append(key, value);
        self
    }

    pub fn with_message(mut self, message: impl Into<Message>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// The configured status, if it terminates the call with an error
    pub fn error_status(&self) -> Option<&Status> {
        self.status.as_ref().filter(|status| status.code() != Code::Ok)
    }
}
