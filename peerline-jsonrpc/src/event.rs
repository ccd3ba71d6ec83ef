//! Events a [`crate::Peer`] raises about things that went wrong but can't be reported to whoever
//! is awaiting a call result.
//!
//! There are exactly two kinds.  A protocol fault means the remote peer sent something invalid;
//! the peer has already answered it with an error message, and the event carries the same error
//! details.  A diagnostic is a local anomaly that never goes over the wire at all: responses that
//! match no call, errors with a null id, and internal errors raised by request handlers.
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{JsonRpcError, types};

#[derive(Debug)]
pub enum PeerEvent {
    /// An inbound message was undecodable or not a valid JSON-RPC message.  The error details
    /// are what was sent back to the remote peer.
    ProtocolFault(types::ErrorDetails),

    /// Something went wrong that the remote peer must not, or cannot, be told about.
    Diagnostic(JsonRpcError),
}

/// Receiver of [`PeerEvent`]s.
///
/// Events are delivered synchronously, from whatever task the peer happens to be running on, so
/// implementations must not block.  Implemented for closures and for the sending half of an
/// unbounded tokio channel.
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: PeerEvent);
}

impl<F> EventSink for F
where
    F: Fn(PeerEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: PeerEvent) {
        self(event)
    }
}

impl EventSink for mpsc::UnboundedSender<PeerEvent> {
    fn on_event(&self, event: PeerEvent) {
        // If nobody is listening anymore the event has already been logged, which is all that
        // would have happened without a sink
        let _ = self.send(event);
    }
}

/// Log an event, then pass it on to the sink, if there is one.
pub(crate) fn emit(sink: Option<&Arc<dyn EventSink>>, event: PeerEvent) {
    match &event {
        PeerEvent::ProtocolFault(details) => {
            tracing::warn!(code = details.code.code(), message = %details.message, "Protocol fault from remote peer");
        }
        PeerEvent::Diagnostic(error @ JsonRpcError::HandlerFailed { .. }) => {
            tracing::error!(?error, "Request handler failed with an internal error");
        }
        PeerEvent::Diagnostic(error) => {
            tracing::warn!(%error, "Peer diagnostic");
        }
    }

    if let Some(sink) = sink {
        sink.on_event(event);
    }
}
