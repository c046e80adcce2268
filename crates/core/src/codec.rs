//! The codec boundary.
//!
//! All journal and index persistence goes through this contract. The engine
//! never depends on a specific binary layout beyond "same type ⇒ same
//! fingerprint ⇒ round-trips", and a deserializer consumes exactly the span
//! its serializer produced, which is what lets callers concatenate encoded
//! values with no separator and recover them by decoding in order.

use serde_json::Value as JsonValue;

use crate::error::{CoreError, CoreResult};

/// Serializes and deserializes JSON payloads to and from byte buffers.
pub trait EntityCodec: Send + Sync {
    /// Encoded size of `value`, in bytes.
    fn size(&self, value: &JsonValue) -> CoreResult<usize>;

    /// Append the encoding of `value` to `buf`.
    fn serialize(&self, value: &JsonValue, buf: &mut Vec<u8>) -> CoreResult<()>;

    /// Decode one value from the front of `buf`, advancing it past the
    /// consumed span.
    fn deserialize(&self, buf: &mut &[u8]) -> CoreResult<JsonValue>;
}

impl<C: EntityCodec + ?Sized> EntityCodec for std::sync::Arc<C> {
    fn size(&self, value: &JsonValue) -> CoreResult<usize> {
        (**self).size(value)
    }

    fn serialize(&self, value: &JsonValue, buf: &mut Vec<u8>) -> CoreResult<()> {
        (**self).serialize(value, buf)
    }

    fn deserialize(&self, buf: &mut &[u8]) -> CoreResult<JsonValue> {
        (**self).deserialize(buf)
    }
}

/// Length-prefixed JSON codec: `u32` little-endian byte length, then the
/// serde_json encoding. The prefix is what makes the encoding self-delimiting.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Convenience: encode a value into a fresh buffer.
    pub fn encode(&self, value: &JsonValue) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(value, &mut buf)?;
        Ok(buf)
    }
}

impl EntityCodec for JsonCodec {
    fn size(&self, value: &JsonValue) -> CoreResult<usize> {
        let body = serde_json::to_vec(value).map_err(|e| CoreError::serialize(e.to_string()))?;
        Ok(4 + body.len())
    }

    fn serialize(&self, value: &JsonValue, buf: &mut Vec<u8>) -> CoreResult<()> {
        let body = serde_json::to_vec(value).map_err(|e| CoreError::serialize(e.to_string()))?;
        let len = u32::try_from(body.len())
            .map_err(|_| CoreError::serialize(format!("value too large: {} bytes", body.len())))?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn deserialize(&self, buf: &mut &[u8]) -> CoreResult<JsonValue> {
        if buf.len() < 4 {
            return Err(CoreError::deserialize("truncated length prefix".to_string()));
        }
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let rest = &buf[4..];
        if rest.len() < len {
            return Err(CoreError::deserialize(format!(
                "truncated body: expected {len} bytes, found {}",
                rest.len()
            )));
        }
        let value = serde_json::from_slice(&rest[..len])
            .map_err(|e| CoreError::deserialize(e.to_string()))?;
        *buf = &rest[len..];
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn size_matches_encoding() {
        let codec = JsonCodec::new();
        let value = json!({"owner": "alice", "number": 42});

        let encoded = codec.encode(&value).unwrap();
        assert_eq!(encoded.len(), codec.size(&value).unwrap());
    }

    #[test]
    fn concatenated_values_decode_in_order() {
        let codec = JsonCodec::new();
        let first = json!("attribute-value");
        let second = json!({"id": "owner", "n": 7});

        let mut buf = Vec::new();
        codec.serialize(&first, &mut buf).unwrap();
        codec.serialize(&second, &mut buf).unwrap();

        let mut cursor = buf.as_slice();
        assert_eq!(codec.deserialize(&mut cursor).unwrap(), first);
        assert_eq!(codec.deserialize(&mut cursor).unwrap(), second);
        assert!(cursor.is_empty());
    }

    #[test]
    fn truncated_input_is_an_error() {
        let codec = JsonCodec::new();
        let encoded = codec.encode(&json!([1, 2, 3])).unwrap();

        let mut cut = &encoded[..encoded.len() - 1];
        assert!(codec.deserialize(&mut cut).is_err());
    }
}
