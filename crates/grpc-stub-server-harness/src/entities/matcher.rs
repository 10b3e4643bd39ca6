use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tonic::Status;

use super::{Handler, Message, Request, Response};
use crate::error::HarnessError;

/// Type alias for request predicates
pub type MatchFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// A registered rule: predicates that must all accept a request, plus the
/// handler chain that answers it
///
/// Chaining methods take `&self` so a matcher can be configured through the
/// `Arc` the dispatcher hands out.
pub struct Matcher {
    state: RwLock<MatcherState>,
}

struct MatcherState {
    match_fns: Vec<MatchFn>,
    handler: Handler,
    requests: Vec<Arc<Request>>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Matcher")
            .field("match_fns", &state.match_fns.len())
            .field("handler", &state.handler)
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl Matcher {
    /// Create a matcher with a single predicate
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        Self::from_match_fn(Arc::new(f))
    }

    pub fn for_service(service: &str) -> Self {
        Self::from_match_fn(service_match_fn(service))
    }

    pub fn for_method(method: &str) -> Self {
        Self::from_match_fn(method_match_fn(method))
    }

    fn from_match_fn(match_fn: MatchFn) -> Self {
        Self {
            state: RwLock::new(MatcherState {
                match_fns: vec![match_fn],
                handler: Handler::new(),
                requests: Vec::new(),
            }),
        }
    }

    /// Add a predicate; the request must satisfy it as well
    pub fn matches<F>(&self, f: F) -> &Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.write().match_fns.push(Arc::new(f));
        self
    }

    /// Also require the request's service to be `service` (a leading `/` is ignored)
    pub fn service(&self, service: &str) -> &Self {
        self.write().match_fns.push(service_match_fn(service));
        self
    }

    /// Also require the request's method to be `method`
    ///
    /// `method` is either a bare method name or `pkg.Service/Method`.
    pub fn method(&self, method: &str) -> &Self {
        self.write().match_fns.push(method_match_fn(method));
        self
    }

    pub fn header(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        let (key, value) = (key.into(), value.into());
        self.write()
            .handler
            .then(move |res| res.headers.append(key.clone(), value.clone()));
        self
    }

    pub fn trailer(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        let (key, value) = (key.into(), value.into());
        self.write()
            .handler
            .then(move |res| res.trailers.append(key.clone(), value.clone()));
        self
    }

    /// Queue a response message
    pub fn response(&self, message: impl Into<Message>) -> &Self {
        let message = message.into();
        self.write()
            .handler
            .then(move |res| res.messages.push(message.clone()));
        self
    }

    /// Queue a response message given as a JSON string
    pub fn response_str(&self, json: &str) -> Result<&Self, HarnessError> {
        let message = Message::from_json_str(json)?;
        Ok(self.response(message))
    }

    pub fn status(&self, status: Status) -> &Self {
        self.write()
            .handler
            .then(move |res| res.status = Some(status.clone()));
        self
    }

    /// Replace the whole chain with `f`
    ///
    /// Decorators added afterwards still apply on top of `f`'s response.
    pub fn handler<F>(&self, f: F) -> &Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.write().handler = Handler::dynamic(f);
        self
    }

    /// Whether every predicate accepts `request`
    pub fn evaluate(&self, request: &Request) -> bool {
        let match_fns = self.read().match_fns.clone();
        match_fns.iter().all(|f| f(request))
    }

    /// Capture `request` and run the handler chain for it
    pub fn respond(&self, request: &Arc<Request>) -> Response {
        let handler = {
            let mut state = self.write();
            state.requests.push(Arc::clone(request));
            state.handler.clone()
        };
        handler.respond(request)
    }

    /// Snapshot of the requests this matcher answered, in receipt order
    pub fn requests(&self) -> Vec<Arc<Request>> {
        self.read().requests.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, MatcherState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MatcherState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn service_match_fn(service: &str) -> MatchFn {
    let service = service.trim_start_matches('/').to_string();
    Arc::new(move |r: &Request| r.service == service)
}

fn method_match_fn(method: &str) -> MatchFn {
    match method.trim_start_matches('/').rsplit_once('/') {
        Some((service, method)) => {
            let (service, method) = (service.to_string(), method.to_string());
            Arc::new(move |r: &Request| r.service == service && r.method == method)
        }
        None => {
            let method = method.to_string();
            Arc::new(move |r: &Request| r.method == method)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CallShape, Metadata, Method};
    use serde_json::json;
    use tonic::Code;

    fn create_test_request(full_name: &str, message: serde_json::Value) -> Arc<Request> {
        let method = Method::from_full_name(full_name, CallShape::Unary);
        Arc::new(Request::new(&method, Metadata::new(), message.into()))
    }

    #[test]
    fn test_matcher_for_method_bare_name() {
        let matcher = Matcher::for_method("GetFeature");
        assert!(matcher.evaluate(&create_test_request("routeguide.RouteGuide.GetFeature", json!({}))));
        assert!(!matcher.evaluate(&create_test_request("routeguide.RouteGuide.ListFeatures", json!({}))));
    }

    #[test]
    fn test_matcher_for_method_with_service() {
        let matcher = Matcher::for_method("/routeguide.RouteGuide/GetFeature");
        assert!(matcher.evaluate(&create_test_request("routeguide.RouteGuide.GetFeature", json!({}))));
        assert!(!matcher.evaluate(&create_test_request("other.RouteGuide.GetFeature", json!({}))));
    }

    #[test]
    fn test_matcher_for_service_trims_leading_slash() {
        let matcher = Matcher::for_service("/routeguide.RouteGuide");
        assert!(matcher.evaluate(&create_test_request("routeguide.RouteGuide.GetFeature", json!({}))));
        assert!(!matcher.evaluate(&create_test_request("test.Pinger.Ping", json!({}))));
    }

    #[test]
    fn test_matcher_predicates_are_anded() {
        let matcher = Matcher::for_method("Ping");
        matcher.matches(|r| r.message["id"] == 2);
        assert!(!matcher.evaluate(&create_test_request("test.Pinger.Ping", json!({"id": 1}))));
        assert!(matcher.evaluate(&create_test_request("test.Pinger.Ping", json!({"id": 2}))));
        assert!(!matcher.evaluate(&create_test_request("test.Pinger.Pong", json!({"id": 2}))));
    }

    #[test]
    fn test_matcher_chain_order_is_declaration_order() {
        let matcher = Matcher::for_method("Ping");
        matcher
            .header("a", "1")
            .response(json!({"x": 1}))
            .header("b", "2");

        let response = matcher.respond(&create_test_request("test.Pinger.Ping", json!({})));
        assert_eq!(response.headers.get("a"), Some("1"));
        assert_eq!(response.headers.get("b"), Some("2"));
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0]["x"], 1);
    }

    #[test]
    fn test_matcher_handler_then_decorators() {
        let matcher = Matcher::for_method("Ping");
        matcher
            .handler(|r| Response::new().with_message(json!({"id": r.message["id"].clone()})))
            .trailer("t", "v")
            .status(Status::aborted("stop"));

        let response = matcher.respond(&create_test_request("test.Pinger.Ping", json!({"id": 7})));
        assert_eq!(response.messages[0]["id"], 7);
        assert_eq!(response.trailers.get("t"), Some("v"));
        assert_eq!(response.error_status().unwrap().code(), Code::Aborted);
    }

    #[test]
    fn test_matcher_handler_replaces_previous_chain() {
        let matcher = Matcher::for_method("Ping");
        matcher.header("dropped", "1").handler(|_| Response::new());

        let response = matcher.respond(&create_test_request("test.Pinger.Ping", json!({})));
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_matcher_response_str() {
        let matcher = Matcher::for_method("Ping");
        matcher.response_str(r#"{"ok": true}"#).unwrap();
        let response = matcher.respond(&create_test_request("test.Pinger.Ping", json!({})));
        assert_eq!(response.messages[0]["ok"], true);

        assert!(matcher.response_str("not json").is_err());
    }

    #[test]
    fn test_matcher_respond_captures_requests_in_order() {
        let matcher = Matcher::for_method("Ping");
        matcher.respond(&create_test_request("test.Pinger.Ping", json!({"n": 1})));
        matcher.respond(&create_test_request("test.Pinger.Ping", json!({"n": 2})));

        let requests = matcher.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].message["n"], 1);
        assert_eq!(requests[1].message["n"], 2);
    }

    #[test]
    fn test_matcher_evaluate_does_not_capture() {
        let matcher = Matcher::for_method("Ping");
        assert!(matcher.evaluate(&create_test_request("test.Pinger.Ping", json!({}))));
        assert!(matcher.requests().is_empty());
    }
}
