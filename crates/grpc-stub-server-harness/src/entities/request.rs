use super::{Message, Metadata, Method};

/// A decoded gRPC request message, as seen by matchers and handlers
///
/// One `Request` is built per received wire message, so a streaming call
/// produces several.
#[derive(Debug, Clone)]
pub struct Request {
    pub service: String,
    pub method: String,
    pub headers: Metadata,
    pub message: Message,
}

impl Request {
    pub fn new(method: &Method, headers: Metadata, message: Message) -> Self {
        Self {
            service: method.service.clone(),
            method: method.name.clone(),
            headers,
            message,
        }
    }

    /// `pkg.Service/Method`
    pub fn full_method(&self) -> String {
        format!("{}/{}", self.service, self.method)
    }
}
