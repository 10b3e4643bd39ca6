mod create_endpoint;
mod dispatcher;
mod handle_call;
pub mod ports;

pub use create_endpoint::{Endpoint, EndpointBuilder, DEFAULT_DRAIN_TIMEOUT};
pub use dispatcher::{Dispatcher, MatchPolicy};
pub use handle_call::MethodRoute;
