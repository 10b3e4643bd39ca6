mod call;
mod codec;
mod schema;
mod server;

pub use call::ServerCall;
pub use codec::MessageCodec;
pub use schema::Schema;
pub use server::{ServeConfig, Server, ServerHandle};
