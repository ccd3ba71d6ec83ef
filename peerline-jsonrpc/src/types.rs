//! Rust struct definitions that ser/de to/from JSON-RPC messages, and the strict classification of
//! arbitrary JSON values into exactly one of the four JSON-RPC message shapes.
//!
//! Every struct here uses `deny_unknown_fields`, so a request carrying `result`, or a response
//! carrying `method`, is rejected rather than silently accepted as something it isn't.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{JsonRpcError, Result};
/// Re-export the protocol building blocks `jsonrpsee` already gets right.
///
/// The version marker only ever (de)serializes as the literal `"2.0"`, and the error code maps the
/// reserved codes to named variants while preserving any application-defined code.
pub use jsonrpsee_types::{error::ErrorCode, params::TwoPointZero};
pub use serde_json::Value as JsonValue;

/// Request Id
///
/// JSON-RPC allows ids to be strings or numbers.  Fractional numbers are technically allowed too
/// but are a terrible idea, so like most implementations we only accept integers that fit in an
/// `i64` (an integral float such as `1.0` counts, and is echoed back as `1`).  The
/// `null` id that error responses may carry is modeled as `Option<Id>` on [`ErrorResponse`].
#[derive(Debug, PartialEq, Clone, Hash, Eq, Serialize, PartialOrd, Ord)]
#[serde(untagged)]
pub enum Id {
    /// Numeric id
    Number(i64),
    /// String id
    Str(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Str(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Str(value.to_string())
    }
}

impl From<Id> for JsonValue {
    fn from(id: Id) -> Self {
        match id {
            Id::Number(n) => JsonValue::from(n),
            Id::Str(s) => JsonValue::String(s),
        }
    }
}

impl TryFrom<&JsonValue> for Id {
    type Error = JsonRpcError;

    fn try_from(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::String(s) => Ok(Id::Str(s.clone())),
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64))
                .map(Id::Number)
                .ok_or_else(|| JsonRpcError::InvalidId { id: value.clone() }),
            _ => Err(JsonRpcError::InvalidId { id: value.clone() }),
        }
    }
}

/// `1.0` is an integer written as a float, and some encoders emit integers that way.  Only values
/// with no fractional part that fit in an `i64` qualify.
fn integral_f64(n: f64) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, hence the strict upper bound
    (n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64).then_some(n as i64)
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Going through `JsonValue` lets us reject fractional floats, which serde would otherwise happily
        // truncate if we deserialized straight into an integer type.
        let value = JsonValue::deserialize(deserializer)?;
        Id::try_from(&value).map_err(serde::de::Error::custom)
    }
}

/// Params must be a structured value (array or object) when present.  `null` is not a structured
/// value, and neither are scalars.
fn structured_params<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<JsonValue>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    match value {
        JsonValue::Array(_) | JsonValue::Object(_) => Ok(Some(value)),
        other => Err(serde::de::Error::custom(format_args!(
            "params must be an array or an object, not {other}"
        ))),
    }
}

/// Request or notification params: an ordered list or a map of named values.
///
/// These are the only two shapes JSON-RPC allows, so anything built from a `Params` can always be
/// parsed back.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Positional params
    Array(Vec<JsonValue>),
    /// Named params
    Object(serde_json::Map<String, JsonValue>),
}

impl Params {
    /// Validate optional raw params.  `None` and `null` both mean no params, since `null` is what
    /// `()` serializes to.  Scalars fail with [`JsonRpcError::InvalidParams`].
    pub fn from_optional(params: Option<JsonValue>) -> Result<Option<Self>> {
        match params {
            None | Some(JsonValue::Null) => Ok(None),
            Some(params) => Self::try_from(params).map(Some),
        }
    }
}

impl TryFrom<JsonValue> for Params {
    type Error = JsonRpcError;

    fn try_from(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Array(items) => Ok(Params::Array(items)),
            JsonValue::Object(map) => Ok(Params::Object(map)),
            params => Err(JsonRpcError::InvalidParams { params }),
        }
    }
}

impl From<Vec<JsonValue>> for Params {
    fn from(items: Vec<JsonValue>) -> Self {
        Params::Array(items)
    }
}

impl From<serde_json::Map<String, JsonValue>> for Params {
    fn from(map: serde_json::Map<String, JsonValue>) -> Self {
        Params::Object(map)
    }
}

impl From<Params> for JsonValue {
    fn from(params: Params) -> Self {
        match params {
            Params::Array(items) => JsonValue::Array(items),
            Params::Object(map) => JsonValue::Object(map),
        }
    }
}

/// Deserialize a present field as `Some`, even when its value is `null`.
///
/// Error `data` may legitimately be `null`, and without this a round trip would lose the field.
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<JsonValue>, D::Error> {
    JsonValue::deserialize(deserializer).map(Some)
}

/// Serializable [JSON-RPC request object](https://www.jsonrpc.org/specification#request-object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// Request ID
    pub id: Id,
    /// Name of the method to be invoked.
    pub method: String,
    /// Parameter values of the request.
    #[serde(default, deserialize_with = "structured_params", skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
}

impl Request {
    /// Create a serializable JSON-RPC method call.
    pub fn new(id: Id, method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            id,
            method: method.into(),
            params: params.map(JsonValue::from),
        }
    }
}

/// Serializable [JSON-RPC notification object](https://www.jsonrpc.org/specification#request-object).
///
/// Differs from the request object in that it does not have an `id` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Notification {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// Name of the method to be invoked.
    pub method: String,
    /// Parameter values of the request.
    #[serde(default, deserialize_with = "structured_params", skip_serializing_if = "Option::is_none")]
    pub params: Option<JsonValue>,
}

impl Notification {
    /// Create a serializable JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            method: method.into(),
            params: params.map(JsonValue::from),
        }
    }
}

/// Successful JSON-RPC [response object](https://www.jsonrpc.org/specification#response_object).
///
/// `result` is mandatory on the wire, but may be `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// Whatever the method returned
    pub result: JsonValue,
    /// Request ID
    pub id: Id,
}

impl Response {
    /// Create a successful response
    pub fn new(id: Id, result: JsonValue) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            result,
            id,
        }
    }
}

/// Failed JSON-RPC [response object](https://www.jsonrpc.org/specification#response_object).
///
/// The id is `None` (serialized as `null`) when the request that caused the error could not be
/// identified, such as when it couldn't even be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// What went wrong
    pub error: ErrorDetails,
    /// Request ID
    pub id: Option<Id>,
}

impl ErrorResponse {
    pub fn new(id: impl Into<Option<Id>>, error: ErrorDetails) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            error,
            id: id.into(),
        }
    }
}

/// [JSON-RPC failed response error details](https://www.jsonrpc.org/specification#error_object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorDetails {
    /// Code
    pub code: ErrorCode,
    /// Message
    pub message: String,
    /// Optional data
    #[serde(default, deserialize_with = "present_value", skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ErrorDetails {
    pub fn new(code: ErrorCode, message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self {
            code,
            message: message.into(),
            data: data.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::ParseError, message, data)
    }
    pub fn invalid_request(message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message, data)
    }
    pub fn method_not_found(message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message, data)
    }
    pub fn invalid_params(message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::InvalidParams, message, data)
    }
    pub fn internal_error(message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::InternalError, message, data)
    }
    pub fn server_error(code: i32, message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::ServerError(code), message, data)
    }
}

/// Loosely-typed description of an error message to send, as accepted by [`build_error`] and
/// [`crate::Peer::push_error`].
///
/// The id is raw JSON because it frequently comes straight from some inbound message that was
/// not itself valid; it is validated when the error message is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSpec {
    /// `None` or `Some(null)` both produce a `null` id on the wire
    pub id: Option<JsonValue>,
    pub code: i64,
    pub message: String,
    pub data: Option<JsonValue>,
}

impl ErrorSpec {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            id: None,
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<JsonValue>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<JsonValue>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl From<ErrorDetails> for ErrorSpec {
    fn from(details: ErrorDetails) -> Self {
        Self {
            id: None,
            code: details.code.code().into(),
            message: details.message,
            data: details.data,
        }
    }
}

/// Every possible (valid) JSON-RPC message that can be sent over the wire.
///
/// Batches are deliberately not represented; a JSON array is not a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// A request with method, id, and optional params
    Request(Request),

    /// A notification with method and optional params but no id
    Notification(Notification),

    /// A successful response with a result
    Response(Response),

    /// An error response
    Error(ErrorResponse),
}

impl Message {
    /// Classify an arbitrary JSON value as exactly one kind of JSON-RPC message.
    ///
    /// The shapes are tried in a fixed order (request, notification, response, error) and the
    /// first structural match wins.  Because every shape denies unknown fields and requires its
    /// distinguishing members, at most one of them can match any given value; the order only
    /// determines which error is reported when none does.
    pub fn parse(value: &JsonValue) -> Result<Self> {
        if let Ok(request) = Request::deserialize(value) {
            return Ok(Message::Request(request));
        }
        if let Ok(notification) = Notification::deserialize(value) {
            return Ok(Message::Notification(notification));
        }
        if let Ok(response) = Response::deserialize(value) {
            return Ok(Message::Response(response));
        }

        // An error response must carry an `id` member even if it's null.  Serde would let a
        // missing `Option` field through, so that is checked explicitly.
        let has_id = value.as_object().is_some_and(|obj| obj.contains_key("id"));
        match ErrorResponse::deserialize(value) {
            Ok(error) if has_id => Ok(Message::Error(error)),
            Ok(_) => Err(JsonRpcError::InvalidMessage {
                source: serde::de::Error::missing_field("id"),
                message: value.clone(),
            }),
            Err(source) => Err(JsonRpcError::InvalidMessage {
                source,
                message: value.clone(),
            }),
        }
    }

    /// Serialize this message into a wire-ready JSON value.
    pub fn to_value(&self) -> Result<JsonValue> {
        serde_json::to_value(self).map_err(|e| JsonRpcError::SerMessage {
            source: e,
            type_name: std::any::type_name::<Self>(),
        })
    }

    /// Short description for log messages
    pub(crate) fn describe(&self) -> String {
        match self {
            Message::Request(req) => format!("request id={}, method={}", req.id, req.method),
            Message::Notification(notif) => format!("notification method={}", notif.method),
            Message::Response(resp) => format!("response id={}", resp.id),
            Message::Error(err) => match &err.id {
                Some(id) => format!("error id={id}, code={}", err.error.code.code()),
                None => format!("error id=null, code={}", err.error.code.code()),
            },
        }
    }
}

/// Build a wire-ready request.  Fails if `id` is not an integer or a string.
///
/// Use [`Params::from_optional`] to turn raw JSON params into [`Params`].
pub fn build_request(id: &JsonValue, method: impl Into<String>, params: Option<Params>) -> Result<JsonValue> {
    let id = Id::try_from(id)?;
    Message::Request(Request::new(id, method, params)).to_value()
}

/// Build a wire-ready notification.  There is no id, so nothing can be invalid.
pub fn build_notification(method: impl Into<String>, params: Option<Params>) -> JsonValue {
    let mut object = serde_json::Map::new();
    object.insert("jsonrpc".to_string(), JsonValue::from("2.0"));
    object.insert("method".to_string(), JsonValue::String(method.into()));
    if let Some(params) = params {
        object.insert("params".to_string(), params.into());
    }
    JsonValue::Object(object)
}

/// Build a wire-ready successful response.
///
/// JSON-RPC has no notion of "no result", so a missing `result` is sent as an explicit `null`.
pub fn build_response(id: &JsonValue, result: Option<JsonValue>) -> Result<JsonValue> {
    let id = Id::try_from(id)?;
    Message::Response(Response::new(id, result.unwrap_or(JsonValue::Null))).to_value()
}

/// Build a wire-ready error response.
///
/// A missing or `null` id is sent as `null`; any other id must be an integer or a string.  The
/// code must fit in the 32-bit range the JSON-RPC error codes live in.
pub fn build_error(spec: ErrorSpec) -> Result<JsonValue> {
    error_response_from_spec(spec).and_then(|error| Message::Error(error).to_value())
}

pub(crate) fn error_response_from_spec(spec: ErrorSpec) -> Result<ErrorResponse> {
    let id = match &spec.id {
        None | Some(JsonValue::Null) => None,
        Some(id) => Some(Id::try_from(id)?),
    };
    let code = i32::try_from(spec.code).map_err(|_| JsonRpcError::InvalidErrorCode { code: spec.code })?;

    Ok(ErrorResponse::new(
        id,
        ErrorDetails::new(ErrorCode::from(code), spec.message, spec.data),
    ))
}
