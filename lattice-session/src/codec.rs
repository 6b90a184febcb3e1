//! Payload codecs for the cookie store.

use crate::error::{SessionError, SessionResult};
use crate::value::SessionValue;
use std::collections::HashMap;

/// Turns session values into bytes and back.
///
/// Implementations must be deterministic in what they accept: anything
/// `encode` produced must `decode` to equal values.
pub trait Codec: Send + Sync {
    fn encode(&self, values: &HashMap<String, SessionValue>) -> SessionResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> SessionResult<HashMap<String, SessionValue>>;
}

/// JSON codec (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    /// JSON has no NaN or infinity, so such floats are rejected rather than
    /// written as `null`.
    fn encode(&self, values: &HashMap<String, SessionValue>) -> SessionResult<Vec<u8>> {
        if let Some((key, _)) = values.iter().find(|(_, v)| v.has_non_finite()) {
            return Err(SessionError::Serialization(format!(
                "value for {:?} holds a non-finite float",
                key
            )));
        }
        serde_json::to_vec(values).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SessionResult<HashMap<String, SessionValue>> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::Serialization(e.to_string()))
    }
}
