use super::{Request, Response};
use std::sync::Arc;

/// Type alias for caller-supplied handler functions
pub type HandlerFn = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Type alias for a single response mutation in a handler chain
pub type MutationFn = Arc<dyn Fn(&mut Response) + Send + Sync>;

/// A response-producing chain
///
/// Responding starts from the base handler's output (or an empty
/// [`Response`] when there is none) and applies every mutation in the order
/// it was added.
#[derive(Clone, Default)]
pub struct Handler {
    base: Option<HandlerFn>,
    mutations: Vec<MutationFn>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("base", &self.base.as_ref().map(|_| "<fn>"))
            .field("mutations", &self.mutations.len())
            .finish()
    }
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain whose base is a caller-supplied function
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        Self {
            base: Some(Arc::new(f)),
            mutations: Vec::new(),
        }
    }

    /// Append a mutation applied after everything already in the chain
    pub fn then<F>(&mut self, f: F)
    where
        F: Fn(&mut Response) + Send + Sync + 'static,
    {
        self.mutations.push(Arc::new(f));
    }

    pub fn respond(&self, request: &Request) -> Response {
        let mut response = match &self.base {
            Some(base) => base(request),
            None => Response::new(),
        };
        for mutation in &self.mutations {
            mutation(&mut response);
        }
        response
    }
}

impl From<Response> for Handler {
    fn from(response: Response) -> Self {
        Handler::dynamic(move |_| response.clone())
    }
}
