//! Simple example demonstrating basic usage of grpc-stub-server-harness
//!
//! This example shows how to:
//! - Load a schema into a `SchemaRegistry`
//! - Start an endpoint and register matchers with static and dynamic responses
//! - Call the stub over HTTP/2 like any gRPC client would
//! - Inspect the captured requests and close the endpoint
//!
//! Run with a descriptor set to serve your own services until Ctrl-C:
//!
//! ```text
//! protoc --include_imports --descriptor_set_out=api.pb api.proto
//! cargo run --example simple -- api.pb
//! ```

use grpc_stub_server_harness::prelude::*;
use grpc_stub_server_harness::use_cases::ports::MessageCodec;
use grpc_stub_server_harness::DynamicCodec;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

/// `greeter.Greeter/SayHello(HelloRequest) returns (HelloReply)`
fn greeter_schema() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("greeter.proto".to_string()),
            package: Some("greeter".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![
                DescriptorProto {
                    name: Some("HelloRequest".to_string()),
                    field: vec![field("name", 1, Type::String)],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("HelloReply".to_string()),
                    field: vec![field("message", 1, Type::String)],
                    ..Default::default()
                },
            ],
            service: vec![ServiceDescriptorProto {
                name: Some("Greeter".to_string()),
                method: vec![MethodDescriptorProto {
                    name: Some("SayHello".to_string()),
                    input_type: Some(".greeter.HelloRequest".to_string()),
                    output_type: Some(".greeter.HelloReply".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Helper to create a gRPC request body with length prefix
fn grpc_request_body(data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(5 + data.len());
    body.push(0); // No compression
    body.extend_from_slice(&(data.len() as u32).to_be_bytes());
    body.extend_from_slice(data);
    body
}

async fn serve_file(path: &str) -> Result<(), HarnessError> {
    let mut schema = SchemaRegistry::new();
    let added = schema.register_bytes(&std::fs::read(path)?)?;
    println!("Registered {added} schema file(s) from {path}");

    let endpoint = EndpointBuilder::new()
        .server(Hyper::default())
        .schema(schema)
        .health_check(true)
        .start()
        .await?;

    // Every call gets an empty reply until more specific matchers are added
    endpoint.match_fn(|_| true);

    for method in endpoint.methods() {
        println!("  {} ({})", method.path(), method.shape);
    }
    println!("Serving on {}, press Ctrl-C to stop", endpoint.url()?);

    tokio::signal::ctrl_c().await?;
    for req in endpoint.requests() {
        println!("Received: {} {}", req.full_method(), req.message.as_value());
    }
    endpoint.close().await
}

#[tokio::main]
async fn main() -> Result<(), HarnessError> {
    if let Some(path) = std::env::args().nth(1) {
        return serve_file(&path).await;
    }

    let mut schema = SchemaRegistry::new();
    schema.register(greeter_schema())?;
    let pool = schema.pool().clone();

    let endpoint = EndpointBuilder::new()
        .server(Hyper::default())
        .schema(schema)
        .start()
        .await?;
    println!("Stub is ready at {}\n", endpoint.url()?);

    // Static response for one caller
    endpoint
        .method("SayHello")
        .matches(|req| req.message["name"] == "admin")
        .header("x-role", "admin")
        .response(json!({"message": "Welcome back"}));

    // Dynamic response for everyone else
    endpoint.method("greeter.Greeter/SayHello").handler(|req| {
        let name = req.message["name"].as_str().unwrap_or("stranger");
        Response::new().with_message(json!({"message": format!("Hello, {name}!")}))
    });

    // The client side of the codec: encodes HelloRequest, decodes HelloReply
    let codec = DynamicCodec::new(
        pool.get_message_by_name("greeter.HelloReply").unwrap(),
        pool.get_message_by_name("greeter.HelloRequest").unwrap(),
    );
    let client = Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build_http();

    for name in ["admin", "Ferris"] {
        let payload = codec
            .encode(&Message::from(json!({"name": name})))
            .expect("valid request");
        let request = hyper::Request::builder()
            .method("POST")
            .uri(format!("{}/greeter.Greeter/SayHello", endpoint.url()?))
            .header("content-type", "application/grpc")
            .body(Full::new(Bytes::from(grpc_request_body(&payload))))
            .unwrap();

        let response = client.request(request).await.expect("call failed");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let reply = codec.decode(&body[5..]).expect("valid reply");
        println!("SayHello({name}) -> {}", reply["message"]);
    }

    println!("\nCaptured {} request(s):", endpoint.requests().len());
    for req in endpoint.requests() {
        println!("  {} {}", req.full_method(), req.message.as_value());
    }

    endpoint.close().await?;
    println!("\nExample completed successfully!");
    Ok(())
}
