mod body;
mod call;
mod framing;
mod health;
mod reflection;
mod server;

pub use server::{Hyper, DEFAULT_MAX_MESSAGE_SIZE};
