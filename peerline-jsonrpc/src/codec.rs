//! Conversion between the raw text of a message and the JSON value the [`crate::Peer`] operates on.
//!
//! Decoding never fails outright.  Text that isn't valid JSON becomes [`Inbound::DecodeFault`],
//! which the peer answers with a parse error instead of the caller having to.
use serde_json::Value as JsonValue;

use crate::{JsonRpcError, Result};

/// A message as handed to [`crate::Peer::receive`]: either a decoded JSON value, or a marker that
/// whatever arrived could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Value(JsonValue),

    /// The reason decoding failed
    DecodeFault(String),
}

impl From<JsonValue> for Inbound {
    fn from(value: JsonValue) -> Self {
        Inbound::Value(value)
    }
}

/// Decode message text into a JSON value.
pub fn decode(text: &str) -> Inbound {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(value) => Inbound::Value(value),
        Err(e) => {
            tracing::trace!(error = %e, "Inbound message is not valid JSON");
            Inbound::DecodeFault(e.to_string())
        }
    }
}

/// Encode a JSON value as compact message text.
pub fn encode(value: &JsonValue) -> Result<String> {
    serde_json::to_string(value).map_err(|e| JsonRpcError::SerMessage {
        source: e,
        type_name: std::any::type_name::<JsonValue>(),
    })
}
