//! Wire codec: JSON or MessagePack framing for the WebSocket stream.
//!
//! Encoding follows the configured codec; decoding is forgiving and falls
//! back from MessagePack to JSON, so either framing is accepted on the read
//! side regardless of configuration.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CodecKind;
use crate::errors::{Result, SimulatorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    kind: CodecKind,
}

impl Codec {
    pub fn new(kind: CodecKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// True when encoded payloads are binary frames
    pub fn is_binary(&self) -> bool {
        self.kind == CodecKind::Msgpack
    }

    pub fn encode<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>> {
        match self.kind {
            CodecKind::Json => serde_json::to_vec(payload)
                .map_err(|err| SimulatorError::network(format!("JSON encode: {}", err))),
            CodecKind::Msgpack => rmp_serde::to_vec_named(payload)
                .map_err(|err| SimulatorError::network(format!("MessagePack encode: {}", err))),
        }
    }

    /// Decode bytes of either framing: MessagePack first, JSON as fallback
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        match rmp_serde::from_slice(bytes) {
            Ok(value) => Ok(value),
            Err(msgpack_err) => serde_json::from_slice(bytes).map_err(|json_err| {
                SimulatorError::network(format!(
                    "decode failed as MessagePack ({}) and JSON ({})",
                    msgpack_err, json_err
                ))
            }),
        }
    }

    /// Decode a text frame (always JSON)
    pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T> {
        serde_json::from_str(text)
            .map_err(|err| SimulatorError::network(format!("JSON decode: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        name: String,
        value: u32,
    }

    fn probe() -> Probe {
        Probe {
            name: "tick".to_string(),
            value: 42,
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let codec = Codec::new(CodecKind::Json);
        let bytes = codec.encode(&probe()).unwrap();
        let decoded: Probe = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, probe());
    }

    #[test]
    fn test_msgpack_roundtrip() {
        let codec = Codec::new(CodecKind::Msgpack);
        assert!(codec.is_binary());
        let bytes = codec.encode(&probe()).unwrap();
        let decoded: Probe = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, probe());
    }

    #[test]
    fn test_decode_falls_back_to_json() {
        // JSON bytes decoded through the fallback path
        let bytes = serde_json::to_vec(&probe()).unwrap();
        let decoded: Probe = Codec::decode(&bytes).unwrap();
        assert_eq!(decoded, probe());
    }

    #[test]
    fn test_garbage_rejected_by_both() {
        let result: Result<Probe> = Codec::decode(b"\x00\xffnot a payload");
        assert!(result.is_err());
    }
}
