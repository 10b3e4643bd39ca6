use bytes::Bytes;

use crate::entities::Message;
use crate::error::CodecError;

/// Transcodes one method's messages between wire bytes and generic documents
///
/// Decoding applies to the method's input type and must emit every field,
/// including unpopulated ones, with enums as numbers and field names exactly
/// as declared in the schema. Encoding applies to the output type and
/// accepts partial documents.
pub trait MessageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;

    fn encode(&self, message: &Message) -> Result<Bytes, CodecError>;
}
