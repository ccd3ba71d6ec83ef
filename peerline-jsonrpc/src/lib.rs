//! A transport-agnostic implementation of the JSON-RPC 2.0 protocol.
//!
//! The centerpiece is the [`Peer`], which is client and server at once: it correlates the calls
//! it makes with the responses that come back, and answers calls from the remote peer using a
//! [`Dispatcher`] or any other [`RequestHandler`].  A peer consumes and produces JSON values and
//! leaves moving them around to the caller, either directly or through a [`Transport`] bound to
//! it with [`PeerBuilder::bind`].
//!
//! This library owes a debt to the [`jsonrpsee`](https://github.com/paritytech/jsonrpsee) project,
//! whose protocol types it reuses.

/// Re-export the exact async-trait macro we use, for implementing the handler traits
#[doc(hidden)]
pub use async_trait::async_trait;

pub mod codec;
mod config;
mod connection;
mod dispatcher;
mod error;
mod event;
mod handler;
pub mod id_gen;
mod peer;
pub mod shape;
#[cfg(test)]
pub mod testing;
mod transport;
pub mod types;

pub use codec::Inbound;
pub use config::{CallOptions, PeerConfig};
pub use connection::Connection;
pub use dispatcher::{Dispatcher, RESERVED_METHOD_PREFIX};
pub use error::{ErrorKind, JsonRpcError, Result};
pub use event::{EventSink, PeerEvent};
pub use handler::{
    HandlerError, HandlerResult, NotificationFn, NotificationHandler, RequestFn, RequestHandler, notification_fn,
    request_fn,
};
pub use id_gen::{CounterIdGenerator, UuidIdGenerator};
pub use peer::{Outbound, Peer, PeerBuilder, RawRequestHandle, RequestHandle, WeakPeer};
pub use shape::ParamShape;
pub use transport::Transport;
pub use types::{
    ErrorCode, ErrorDetails, ErrorResponse, ErrorSpec, Id, JsonValue, Message, Notification, Params, Request, Response,
    TwoPointZero, build_error, build_notification, build_request, build_response,
};
