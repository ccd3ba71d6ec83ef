//! After JSON RPC messages have been decoded, those that represent method calls or notifications
//! need to be routed to the corresponding handler, and that handler invoked.  That is the job of
//! the [`Dispatcher`].
//!
//! Unlike a plain method-name router, each method name can have several handlers ("overloads")
//! registered, each declaring the [`ParamShape`] it accepts.  An incoming call is routed to the
//! first overload, in registration order, whose shape accepts the params.
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::handler::{HandlerError, HandlerResult, NotificationHandler, RequestHandler};
use crate::shape::ParamShape;
use crate::{JsonRpcError, Result, types};

/// Method names starting with this prefix are reserved by JSON-RPC for rpc-internal methods.
pub const RESERVED_METHOD_PREFIX: &str = "rpc.";

type ErasedRequestFn =
    Box<dyn Fn(Option<&JsonValue>) -> std::result::Result<BoxFuture<'static, HandlerResult>, String> + Send + Sync>;
type ErasedNotificationFn =
    Box<dyn Fn(Option<&JsonValue>) -> std::result::Result<BoxFuture<'static, HandlerResult<()>>, String> + Send + Sync>;
type DefaultNotificationFn = Arc<dyn Fn(&str, Option<JsonValue>) + Send + Sync>;

/// One registered handler for a method, along with the name of the shape it accepts
struct Overload<F> {
    shape_name: Cow<'static, str>,
    invoke: F,
}

impl<F> Overload<F> {
    fn rejection(&self, reason: String) -> JsonValue {
        json!({ "shape": self.shape_name, "error": reason })
    }
}

/// Routes method calls and notifications to typed handlers by method name and params shape.
///
/// The dispatcher implements both [`RequestHandler`] and [`NotificationHandler`], so it can be
/// attached to a [`crate::Peer`] with [`crate::PeerBuilder::with_dispatcher`].
pub struct Dispatcher {
    request_handlers: HashMap<String, Vec<Overload<ErasedRequestFn>>>,
    notification_handlers: HashMap<String, Vec<Overload<ErasedNotificationFn>>>,
    default_notification_handler: DefaultNotificationFn,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            request_handlers: HashMap::new(),
            notification_handlers: HashMap::new(),
            default_notification_handler: Arc::new(|_method, _params| {}),
        }
    }

    /// Register a handler for method calls to `method` whose params fit `shape`.
    ///
    /// Handlers registered earlier for the same method take precedence; this one is only invoked
    /// if none of them accepts the params.
    pub fn register_request_handler<P, F, Fut, R>(
        &mut self,
        method: impl Into<String>,
        shape: P,
        handler: F,
    ) -> Result<()>
    where
        P: ParamShape,
        F: Fn(P::Output) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        let method = check_method_name(method.into())?;
        let shape_name = shape.name();
        let invoke: ErasedRequestFn = Box::new(move |params: Option<&JsonValue>| {
            shape.decode(params).map(|decoded| {
                handler(decoded)
                    .map(|result| {
                        result.and_then(|value| {
                            serde_json::to_value(value).map_err(|e| {
                                HandlerError::Internal(anyhow::Error::new(e).context(format!(
                                    "Error serializing handler result of type {}",
                                    std::any::type_name::<R>()
                                )))
                            })
                        })
                    })
                    .boxed()
            })
        });

        self.request_handlers
            .entry(method)
            .or_default()
            .push(Overload { shape_name, invoke });
        Ok(())
    }

    /// Register a handler for notifications of `method` whose params fit `shape`.
    ///
    /// An error returned by the handler goes nowhere but the debug log; notifications have no way
    /// to report failure to the remote peer.
    pub fn register_notification_handler<P, F, Fut>(
        &mut self,
        method: impl Into<String>,
        shape: P,
        handler: F,
    ) -> Result<()>
    where
        P: ParamShape,
        F: Fn(P::Output) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let method = check_method_name(method.into())?;
        let shape_name = shape.name();
        let invoke: ErasedNotificationFn = Box::new(move |params: Option<&JsonValue>| {
            shape.decode(params).map(|decoded| handler(decoded).boxed())
        });

        self.notification_handlers
            .entry(method)
            .or_default()
            .push(Overload { shape_name, invoke });
        Ok(())
    }

    /// Replace the handler invoked for notifications that no registered handler accepts.
    ///
    /// By default such notifications are ignored.
    pub fn set_default_notification_handler(
        &mut self,
        handler: impl Fn(&str, Option<JsonValue>) + Send + Sync + 'static,
    ) {
        self.default_notification_handler = Arc::new(handler);
    }

    /// Route a method call to the first handler that accepts its params.
    ///
    /// Fails with `MethodNotFound` if nothing is registered for `method`, or `InvalidParams` if
    /// nothing registered accepts the params, in which case the error data lists why each
    /// overload rejected them.
    pub fn resolve_request(&self, method: &str, params: Option<JsonValue>) -> BoxFuture<'static, HandlerResult> {
        let Some(overloads) = self.request_handlers.get(method) else {
            tracing::debug!(method, "No request handler registered for method");
            let error = types::ErrorDetails::method_not_found(
                types::ErrorCode::MethodNotFound.message(),
                json!({ "method": method }),
            );
            return futures::future::ready(Err(error.into())).boxed();
        };

        let mut rejections = Vec::with_capacity(overloads.len());
        for (index, overload) in overloads.iter().enumerate() {
            match (overload.invoke)(params.as_ref()) {
                Ok(future) => {
                    tracing::trace!(method, overload = index, shape = %overload.shape_name, "Dispatching request");
                    return future;
                }
                Err(reason) => rejections.push(overload.rejection(reason)),
            }
        }

        tracing::debug!(
            method,
            shapes = %overloads.iter().map(|o| &o.shape_name).join(", "),
            "No request handler accepts the params"
        );
        let error = types::ErrorDetails::invalid_params(
            types::ErrorCode::InvalidParams.message(),
            JsonValue::Array(rejections),
        );
        futures::future::ready(Err(error.into())).boxed()
    }

    /// Route a notification to the first handler that accepts its params, or to the default
    /// notification handler if there isn't one.
    ///
    /// Never fails, since there is nobody to report failure to.
    pub fn resolve_notification(&self, method: &str, params: Option<JsonValue>) -> BoxFuture<'static, ()> {
        let overloads = self.notification_handlers.get(method).map(Vec::as_slice).unwrap_or_default();

        for (index, overload) in overloads.iter().enumerate() {
            if let Ok(future) = (overload.invoke)(params.as_ref()) {
                tracing::trace!(method, overload = index, shape = %overload.shape_name, "Dispatching notification");
                let method = method.to_string();
                return future
                    .map(move |result| {
                        if let Err(error) = result {
                            tracing::debug!(%method, ?error, "Notification handler failed");
                        }
                    })
                    .boxed();
            }
        }

        tracing::trace!(method, "No notification handler accepts the params; using default handler");
        (self.default_notification_handler)(method, params);
        futures::future::ready(()).boxed()
    }

    /// Names of all methods with at least one request handler registered
    pub fn request_methods(&self) -> impl Iterator<Item = &str> {
        self.request_handlers.keys().map(String::as_str)
    }
}

fn check_method_name(method: String) -> Result<String> {
    if method.starts_with(RESERVED_METHOD_PREFIX) {
        Err(JsonRpcError::ReservedMethodName { method })
    } else {
        Ok(method)
    }
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle_request(&self, method: &str, params: Option<JsonValue>) -> HandlerResult {
        self.resolve_request(method, params).await
    }
}

#[async_trait]
impl NotificationHandler for Dispatcher {
    async fn handle_notification(&self, method: &str, params: Option<JsonValue>) {
        self.resolve_notification(method, params).await
    }
}
