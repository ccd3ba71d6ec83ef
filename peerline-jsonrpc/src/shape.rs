//! Parameter shapes describe what params a handler registered with the [`crate::Dispatcher`]
//! accepts.
//!
//! A shape is both a predicate and a decoder: it either rejects the raw params with a diagnostic
//! message, or turns them into the value the handler is called with.  That value need not look
//! anything like the wire JSON; a shape can parse a string into a timestamp, pick fields out of an
//! object, and so on.  Handlers never see the raw params unless they ask for them with [`raw`].
use std::any::type_name;
use std::borrow::Cow;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Validator and decoder for method params.
pub trait ParamShape: Send + Sync + 'static {
    /// What the params decode into
    type Output: Send + 'static;

    /// Check `params` against this shape, producing the decoded value or a human-readable reason
    /// the params don't fit.
    ///
    /// `None` means the params member was omitted from the message.
    fn decode(&self, params: Option<&JsonValue>) -> Result<Self::Output, String>;

    /// Name of this shape for diagnostics
    fn name(&self) -> Cow<'static, str>;
}

/// Shape that deserializes params into `T` with serde.
///
/// Omitted params are deserialized from `null`, so `T = ()` or `T = Option<_>` accept calls
/// without params while structs do not.
pub struct Typed<T>(PhantomData<fn() -> T>);

/// Params must deserialize into `T`
pub fn typed<T: DeserializeOwned + Send + 'static>() -> Typed<T> {
    Typed(PhantomData)
}

impl<T: DeserializeOwned + Send + 'static> ParamShape for Typed<T> {
    type Output = T;

    fn decode(&self, params: Option<&JsonValue>) -> Result<T, String> {
        let params = params.cloned().unwrap_or(JsonValue::Null);
        serde_json::from_value(params).map_err(|e| e.to_string())
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(type_name::<T>())
    }
}

/// Shape that accepts anything and hands the handler the raw params.
pub struct Raw;

/// Accept any params, untouched
pub fn raw() -> Raw {
    Raw
}

impl ParamShape for Raw {
    type Output = Option<JsonValue>;

    fn decode(&self, params: Option<&JsonValue>) -> Result<Self::Output, String> {
        Ok(params.cloned())
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("raw")
    }
}

/// Shape that only accepts calls without params.
pub struct Empty;

/// Params must be omitted, or an empty array or object
pub fn empty() -> Empty {
    Empty
}

impl ParamShape for Empty {
    type Output = ();

    fn decode(&self, params: Option<&JsonValue>) -> Result<(), String> {
        match params {
            None => Ok(()),
            Some(JsonValue::Array(items)) if items.is_empty() => Ok(()),
            Some(JsonValue::Object(fields)) if fields.is_empty() => Ok(()),
            Some(other) => Err(format!("expected no params, got {other}")),
        }
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("empty")
    }
}

/// Shape implemented by an arbitrary decoding function.
pub struct Custom<F> {
    name: Cow<'static, str>,
    decode: F,
}

/// Validate and decode params with `decode`, reporting the shape as `name` in diagnostics.
pub fn custom<F, T>(name: impl Into<Cow<'static, str>>, decode: F) -> Custom<F>
where
    F: Fn(Option<&JsonValue>) -> Result<T, String> + Send + Sync + 'static,
    T: Send + 'static,
{
    Custom {
        name: name.into(),
        decode,
    }
}

impl<F, T> ParamShape for Custom<F>
where
    F: Fn(Option<&JsonValue>) -> Result<T, String> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn decode(&self, params: Option<&JsonValue>) -> Result<T, String> {
        (self.decode)(params)
    }

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}
