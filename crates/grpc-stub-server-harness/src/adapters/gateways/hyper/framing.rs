use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use tonic::Status;
use tracing::warn;

use crate::entities::Metadata;

pub(super) const GRPC_CONTENT_TYPE: &str = "application/grpc";

const GRPC_TIMEOUT: &str = "grpc-timeout";

/// 1 byte compression flag + 4 bytes big-endian length
const PREFIX_LEN: usize = 5;

/// Pop one complete length-prefixed message off the front of `buf`
///
/// Returns `Ok(None)` while the message is still incomplete.
pub(super) fn decode_frame(buf: &mut BytesMut, max_message_size: usize) -> Result<Option<Bytes>, Status> {
    if buf.len() < PREFIX_LEN {
        return Ok(None);
    }

    match buf[0] {
        0 => {}
        1 => return Err(Status::unimplemented("compressed messages are not supported")),
        flag => return Err(Status::internal(format!("invalid compression flag {flag}"))),
    }

    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    if len > max_message_size {
        return Err(Status::resource_exhausted(format!(
            "message of {len} bytes exceeds the {max_message_size} byte limit"
        )));
    }
    if buf.len() < PREFIX_LEN + len {
        buf.reserve(PREFIX_LEN + len - buf.len());
        return Ok(None);
    }

    buf.advance(PREFIX_LEN);
    Ok(Some(buf.split_to(len).freeze()))
}

pub(super) fn encode_frame(message: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + message.len());
    buf.put_u8(0);
    buf.put_u32(message.len() as u32);
    buf.put_slice(message);
    buf.freeze()
}

/// Deadline carried by the `grpc-timeout` request header
///
/// The value is at most eight digits followed by a unit (`H`, `M`, `S`, `m`,
/// `u` or `n`). Malformed values are ignored.
pub(super) fn grpc_timeout(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(GRPC_TIMEOUT)?.to_str().ok()?;
    if value.len() < 2 || value.len() > 9 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

pub(super) fn to_header_map(metadata: &Metadata) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(metadata.len());
    for (key, value) in metadata.iter() {
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(%key, "dropping metadata entry that is not a valid header"),
        }
    }
    headers
}

/// Client metadata, skipping values that are not valid UTF-8
pub(super) fn to_metadata(headers: &HeaderMap) -> Metadata {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .collect()
}
