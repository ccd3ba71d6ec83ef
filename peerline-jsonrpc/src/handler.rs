//! A peer can expose methods that are called in an RPC style by the remote peer, or invoked in a
//! fire-and-forget style as notifications.  The code that runs in response is called a "handler".
//!
//! [`RequestHandler`] and [`NotificationHandler`] are the contracts the [`crate::Peer`] invokes.
//! Most users will not implement them directly; a [`crate::Dispatcher`] implements both and routes
//! to typed per-method handlers, while [`request_fn`] and [`notification_fn`] adapt plain async
//! closures for when a single catch-all function is all that's needed.
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::types;

/// How a handler reports failure.
///
/// The distinction matters for what the remote peer gets to see.  An `Rpc` error was raised on
/// purpose and is sent back as-is, code, message, data and all.  An `Internal` error is anything
/// else; the remote peer only learns that an internal error happened, while the real error is
/// raised locally as a diagnostic event.
#[derive(Debug)]
pub enum HandlerError {
    Rpc(types::ErrorDetails),
    Internal(anyhow::Error),
}

impl HandlerError {
    /// Shorthand for an application-defined error code
    pub fn rpc(code: i32, message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::Rpc(types::ErrorDetails::new(types::ErrorCode::from(code), message, data))
    }
}

impl From<types::ErrorDetails> for HandlerError {
    fn from(details: types::ErrorDetails) -> Self {
        Self::Rpc(details)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

pub type HandlerResult<T = JsonValue> = std::result::Result<T, HandlerError>;

/// Handles method call requests from the remote peer.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the result of calling `method` with `params`.
    async fn handle_request(&self, method: &str, params: Option<JsonValue>) -> HandlerResult;
}

/// Handles notifications from the remote peer.
///
/// There is no way to report anything back to the remote peer, so there's no return value.
#[async_trait]
pub trait NotificationHandler: Send + Sync + 'static {
    async fn handle_notification(&self, method: &str, params: Option<JsonValue>);
}

/// [`RequestHandler`] implemented by an async function of the method name and params.
///
/// See [`request_fn`].
#[derive(Clone)]
pub struct RequestFn<F>(F);

/// Wrap an async function taking the method name and params as a [`RequestHandler`].
pub fn request_fn<F, Fut>(f: F) -> RequestFn<F>
where
    F: Fn(String, Option<JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    RequestFn(f)
}

#[async_trait]
impl<F, Fut> RequestHandler for RequestFn<F>
where
    F: Fn(String, Option<JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle_request(&self, method: &str, params: Option<JsonValue>) -> HandlerResult {
        (self.0)(method.to_string(), params).await
    }
}

/// [`NotificationHandler`] implemented by an async function of the method name and params.
///
/// See [`notification_fn`].
#[derive(Clone)]
pub struct NotificationFn<F>(F);

/// Wrap an async function taking the method name and params as a [`NotificationHandler`].
pub fn notification_fn<F, Fut>(f: F) -> NotificationFn<F>
where
    F: Fn(String, Option<JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    NotificationFn(f)
}

#[async_trait]
impl<F, Fut> NotificationHandler for NotificationFn<F>
where
    F: Fn(String, Option<JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle_notification(&self, method: &str, params: Option<JsonValue>) {
        (self.0)(method.to_string(), params).await
    }
}
