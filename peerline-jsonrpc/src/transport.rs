//! A "transport" abstracts away the details of how message text gets to and from the remote peer.
//!
//! The [`crate::Peer`] itself never touches a transport; it consumes and produces JSON values.
//! This trait exists so that [`crate::Connection`] can pump any transport through a peer, framing
//! and all.  At this level a transport is very simply a source and a sink of message text, which
//! makes for a deceptively simple abstraction.
//!
//! Whatever is on the other end (a TCP socket, a child process's stdio, an in-memory channel) is
//! assumed to already be connected.  Establishing the connection is the caller's problem.
use std::borrow::Cow;

use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt, TryFutureExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{self, Framed};

use crate::{JsonRpcError, Result};

/// A source and sink of JSON-RPC message text, interfacing with some underlying transport layer
/// provided by the caller.
///
/// Message text is opaque to the transport.  It is not required to be valid JSON in either
/// direction; the peer deals with anything that isn't.
pub trait Transport: Send + Sized + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transport-specific identifier of the remote peer, useful for logging and debugging.
    fn remote_peer(&self) -> Cow<'static, str>;

    /// Send a message to the transport.  Should not complete until the message has been handed off
    /// to the transport layer, whatever that means for the particular transport.
    ///
    /// This does not need to be cancellation-safe; the connection always waits for this future to
    /// finish.
    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

    /// Receive a message from the transport.
    ///
    /// This future must be cancellation-safe: if it's dropped before it completes, no partial or
    /// missed messages may result, because the connection polls it alongside other events.
    ///
    /// Returns `Ok(None)` once the transport is closed and no more messages can be received.
    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;
}

/// Any stream of inbound text paired with a sink for outbound text is a transport.  Handy for
/// channels, and for tests.
impl<In, InErr, Out> Transport for (In, Out)
where
    In: Stream<Item = Result<String, InErr>> + Unpin + Send + 'static,
    InErr: std::error::Error + Send + Sync + 'static,
    Out: Sink<String> + Unpin + Send + 'static,
    Out::Error: std::error::Error + Send + Sync + 'static,
{
    type Error = JsonRpcError;

    fn remote_peer(&self) -> Cow<'static, str> {
        format!("({}, {})", std::any::type_name::<In>(), std::any::type_name::<Out>()).into()
    }

    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
        self.1.send(message).map_err(JsonRpcError::transport)
    }

    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_ {
        self.0
            .next()
            .map(|next: Option<Result<String, InErr>>| next.transpose().map_err(JsonRpcError::transport))
    }
}

/// Newline-delimited message text over anything that implements [`tokio::io::AsyncRead`] and
/// [`tokio::io::AsyncWrite`].
///
/// Works for sockets and pipes, and for a process's own stdio by way of
/// [`tokio::io::join`].  Outbound messages never contain a raw newline since they're compact JSON.
impl<Io> Transport for Framed<Io, codec::LinesCodec>
where
    Io: Send + Unpin + AsyncRead + AsyncWrite + 'static,
{
    type Error = JsonRpcError;

    fn remote_peer(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Io>())
    }

    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
        self.send(message).map_err(JsonRpcError::transport)
    }

    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_ {
        // `StreamExt::next` doesn't take ownership of the stream, and `Framed` buffers partial
        // lines internally, so dropping this future loses nothing
        self.next()
            .map(|next: Option<Result<String, codec::LinesCodecError>>| {
                next.transpose().map_err(JsonRpcError::transport)
            })
    }
}
