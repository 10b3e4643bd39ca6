use bytes::Bytes;
use prost::Message as _;
use prost_reflect::{DynamicMessage, MessageDescriptor, SerializeOptions};

use crate::entities::Message;
use crate::error::CodecError;
use crate::use_cases::ports::MessageCodec;

/// Transcodes one method's messages between protobuf bytes and documents
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    input: MessageDescriptor,
    output: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(input: MessageDescriptor, output: MessageDescriptor) -> Self {
        Self { input, output }
    }

    fn serialize_options() -> SerializeOptions {
        SerializeOptions::new()
            .use_proto_field_name(true)
            .use_enum_numbers(true)
            .skip_default_fields(false)
    }
}

impl MessageCodec for DynamicCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        let message = DynamicMessage::decode(self.input.clone(), bytes)?;
        let value = message
            .serialize_with_options(serde_json::value::Serializer, &Self::serialize_options())?;
        Ok(Message::from(value))
    }

    fn encode(&self, message: &Message) -> Result<Bytes, CodecError> {
        let message = DynamicMessage::deserialize(self.output.clone(), message.as_value().clone())?;
        Ok(Bytes::from(message.encode_to_vec()))
    }
}
