//! Pluggable payload serialization.
//!
//! Each interface connection owns its serializer, so different
//! interfaces can use different encodings without global coordination.
//! The default encodes [`ArgValue`] as tagged JSON, which keeps
//! payloads self-describing on the wire.

use crate::error::ProxyError;
use rcm_common::arg_value::ArgValue;

/// Encodes command arguments, results, and event payloads.
pub trait PayloadSerializer: Send + Sync {
    fn serialize(&self, value: &ArgValue) -> Result<Vec<u8>, ProxyError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<ArgValue, ProxyError>;
}

/// Tagged-JSON payload encoding, the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn serialize(&self, value: &ArgValue) -> Result<Vec<u8>, ProxyError> {
        serde_json::to_vec(value).map_err(|e| ProxyError::Serialization { reason: e.to_string() })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ArgValue, ProxyError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ProxyError::Serialization { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let serializer = JsonSerializer;
        let value = ArgValue::FloatVec(vec![1.0, 2.5]);
        let bytes = serializer.serialize(&value).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let serializer = JsonSerializer;
        assert!(matches!(
            serializer.deserialize(b"{\"type\":\"no_such_variant\"}"),
            Err(ProxyError::Serialization { .. })
        ));
        assert!(matches!(
            serializer.deserialize(b"\x00\x01garbage"),
            Err(ProxyError::Serialization { .. })
        ));
    }
}
