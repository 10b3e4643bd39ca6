use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entities::{Matcher, Request};

/// How many matchers answer a single request on the streaming-response shapes
///
/// Unary and client-streaming calls always stop at the first matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Every matching matcher answers, in registration order
    #[default]
    AllMatches,
    /// Only the earliest-registered matching matcher answers
    FirstMatch,
}

/// Owns the ordered matcher list and the global capture log
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: RwLock<DispatcherState>,
}

#[derive(Debug, Default)]
struct DispatcherState {
    matchers: Vec<Arc<Matcher>>,
    requests: Vec<Arc<Request>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a matcher after every existing one
    pub fn add_matcher(&self, matcher: Matcher) -> Arc<Matcher> {
        let matcher = Arc::new(matcher);
        self.write().matchers.push(Arc::clone(&matcher));
        matcher
    }

    /// Register a matcher with a custom predicate
    pub fn match_fn<F>(&self, f: F) -> Arc<Matcher>
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.add_matcher(Matcher::new(f))
    }

    /// Register a matcher for every method of `service`
    pub fn service(&self, service: &str) -> Arc<Matcher> {
        self.add_matcher(Matcher::for_service(service))
    }

    /// Register a matcher for `method` (bare name or `pkg.Service/Method`)
    pub fn method(&self, method: &str) -> Arc<Matcher> {
        self.add_matcher(Matcher::for_method(method))
    }

    /// Append a received request to the global log
    pub fn record(&self, request: Request) -> Arc<Request> {
        let request = Arc::new(request);
        self.write().requests.push(Arc::clone(&request));
        request
    }

    /// Earliest-registered matcher whose predicates all accept `request`
    pub fn first_match(&self, request: &Request) -> Option<Arc<Matcher>> {
        self.matchers().into_iter().find(|m| m.evaluate(request))
    }

    /// Every matcher whose predicates all accept `request`, in registration order
    pub fn all_matches(&self, request: &Request) -> Vec<Arc<Matcher>> {
        self.matchers()
            .into_iter()
            .filter(|m| m.evaluate(request))
            .collect()
    }

    /// Matchers answering `request` on a streaming-response call
    pub fn resolve(&self, request: &Request, policy: MatchPolicy) -> Vec<Arc<Matcher>> {
        match policy {
            MatchPolicy::AllMatches => self.all_matches(request),
            MatchPolicy::FirstMatch => self.first_match(request).into_iter().collect(),
        }
    }

    pub fn matchers(&self) -> Vec<Arc<Matcher>> {
        self.read().matchers.clone()
    }

    /// Snapshot of every received request, in receipt order
    pub fn requests(&self) -> Vec<Arc<Request>> {
        self.read().requests.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, DispatcherState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DispatcherState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
