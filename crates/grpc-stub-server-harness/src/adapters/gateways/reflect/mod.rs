mod codec;
pub(crate) mod schema;

pub use codec::DynamicCodec;
pub use schema::SchemaRegistry;
