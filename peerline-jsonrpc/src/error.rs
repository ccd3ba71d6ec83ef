use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types;

pub type Result<T, E = JsonRpcError> = std::result::Result<T, E>;

/// Broad classification of every [`JsonRpcError`].
///
/// Callers that need to react differently to, say, a timed out call versus a remote error should
/// match on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wire-level error carrying a JSON-RPC error code, either received from or destined for the
    /// remote peer
    Protocol,
    /// A local outbound call failed without the remote peer reporting an error (timeout, closed
    /// stream)
    Call,
    /// A response or error arrived that doesn't match any outstanding call
    Correlation,
    /// The id generator misbehaved.  These are programming errors and are never retried.
    Fatal,
    /// Everything else that stays local: invalid arguments, serialization, transport failures
    Local,
}

#[derive(Debug, Error)]
pub enum JsonRpcError {
    #[error("Value is not a valid JSON-RPC 2.0 message")]
    InvalidMessage { source: serde_json::Error, message: JsonValue },

    #[error("Invalid JSON-RPC id {id}; ids must be integers or strings")]
    InvalidId { id: JsonValue },

    #[error("Invalid JSON-RPC error code {code}; codes must be 32-bit integers")]
    InvalidErrorCode { code: i64 },

    #[error("Id generator start value {start} is outside the safe integer range")]
    InvalidIdStart { start: i64 },

    #[error("Params must be an array or an object, not {params}")]
    InvalidParams { params: JsonValue },

    #[error("Method name '{method}' uses the reserved 'rpc.' prefix")]
    ReservedMethodName { method: String },

    #[error("Id generator is exhausted; no more request ids can be issued")]
    IdGeneratorExhausted,

    #[error("Id generator produced id {id} which is already in use by an outstanding call")]
    DuplicateRequestId { id: types::Id },

    #[error("Call to '{method}' (request id {id}) timed out")]
    Timeout { method: String, id: types::Id },

    #[error("Connection to the remote peer is closed")]
    StreamClosed,

    #[error("Received a response for request id {id} which matches no outstanding call")]
    UnexpectedResponse { id: types::Id },

    #[error("Method '{method}' failed with error {}: {}", error.code, error.message)]
    MethodError { method: String, error: types::ErrorDetails },

    #[error("Remote peer reported an error not attributable to any request: {}: {}", error.code, error.message)]
    UnattributedError { error: types::ErrorDetails },

    #[error("Handler for method '{method}' failed with an internal error")]
    HandlerFailed {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Error serializing request params of type {type_name} to JSON")]
    SerRequest {
        source: serde_json::Error,
        type_name: &'static str,
    },

    #[error("Error deserializing response to type {type_name}")]
    DeserResponse {
        source: serde_json::Error,
        type_name: &'static str,
        response: JsonValue,
    },

    #[error("Error serializing {type_name} to JSON")]
    SerMessage {
        source: serde_json::Error,
        type_name: &'static str,
    },

    #[error("Transport error")]
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl JsonRpcError {
    /// Which part of the error taxonomy this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MethodError { .. } | Self::UnattributedError { .. } => ErrorKind::Protocol,
            Self::Timeout { .. } | Self::StreamClosed => ErrorKind::Call,
            Self::UnexpectedResponse { .. } => ErrorKind::Correlation,
            Self::IdGeneratorExhausted | Self::DuplicateRequestId { .. } => ErrorKind::Fatal,
            Self::InvalidMessage { .. }
            | Self::InvalidId { .. }
            | Self::InvalidErrorCode { .. }
            | Self::InvalidIdStart { .. }
            | Self::InvalidParams { .. }
            | Self::ReservedMethodName { .. }
            | Self::HandlerFailed { .. }
            | Self::SerRequest { .. }
            | Self::DeserResponse { .. }
            | Self::SerMessage { .. }
            | Self::Transport { .. }
            | Self::Cancelled => ErrorKind::Local,
        }
    }

    /// The JSON-RPC error details reported by the remote peer, if this error originated there.
    pub fn remote_error(&self) -> Option<&types::ErrorDetails> {
        match self {
            Self::MethodError { error, .. } | Self::UnattributedError { error } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport {
            source: Box::new(source),
        }
    }
}
