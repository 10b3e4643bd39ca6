//! gRPC Stub Server Harness
//!
//! A programmable gRPC stub server for testing clients against real wire
//! traffic. Methods come from protobuf descriptors; responses come from
//! matchers registered at runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use grpc_stub_server_harness::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HarnessError> {
//!     // Descriptor set produced with
//!     // `protoc --include_imports --descriptor_set_out=routeguide.pb routeguide.proto`
//!     let mut schema = SchemaRegistry::new();
//!     schema.register_bytes(&std::fs::read("routeguide.pb")?)?;
//!
//!     let endpoint = EndpointBuilder::new()
//!         .server(Hyper::default())
//!         .schema(schema)
//!         .start()
//!         .await?;
//!
//!     // Answer GetFeature for points with latitude 1
//!     endpoint
//!         .method("routeguide.RouteGuide/GetFeature")
//!         .matches(|req| req.message["latitude"] == 1)
//!         .header("x-stub", "true")
//!         .response(json!({"name": "north"}));
//!
//!     // Everything else on the service fails
//!     endpoint
//!         .service("routeguide.RouteGuide")
//!         .status(Status::unavailable("try later"));
//!
//!     println!("serving on {}", endpoint.url()?);
//!     // ... run the client under test ...
//!
//!     for req in endpoint.requests() {
//!         println!("Received: {} {}", req.full_method(), req.message.as_value());
//!     }
//!
//!     endpoint.close().await?;
//!     Ok(())
//! }
//! ```

mod adapters;
pub mod entities;
pub mod error;
pub mod use_cases;

pub use error::{CodecError, HarnessError};

pub use adapters::gateways::{DynamicCodec, SchemaRegistry};
#[cfg(feature = "hyper")]
pub use adapters::gateways::{Hyper, DEFAULT_MAX_MESSAGE_SIZE};

pub use use_cases::{Endpoint, EndpointBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::entities::{
        CallShape, Handler, LifecycleState, Matcher, Message, Metadata, Method, Request, Response,
    };
    pub use crate::error::HarnessError;
    pub use crate::use_cases::{Endpoint, EndpointBuilder, MatchPolicy};
    pub use crate::SchemaRegistry;

    #[cfg(feature = "hyper")]
    pub use crate::Hyper;

    pub use serde_json::json;
    pub use tonic::{Code, Status};
}
