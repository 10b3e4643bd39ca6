#[cfg(feature = "hyper")]
mod hyper;
mod reflect;

#[cfg(feature = "hyper")]
pub use self::hyper::{Hyper, DEFAULT_MAX_MESSAGE_SIZE};
pub use reflect::{DynamicCodec, SchemaRegistry};
