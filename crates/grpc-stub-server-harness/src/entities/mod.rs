mod handler;
mod lifecycle;
mod matcher;
mod message;
mod metadata;
mod method;
mod request;
mod response;

pub use handler::{Handler, HandlerFn, MutationFn};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use matcher::{MatchFn, Matcher};
pub use message::Message;
pub use metadata::Metadata;
pub use method::{split_full_name, CallShape, Method};
pub use request::Request;
pub use response::Response;
