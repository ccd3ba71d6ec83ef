//! Drives a [`Peer`] over a [`Transport`].
//!
//! The event loop runs in its own async task.  It writes everything the peer produces to the
//! transport, hands everything read from the transport to the peer, and closes the peer when
//! either side of the conversation ends.
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::codec;
use crate::peer::{Outbound, Peer, PeerBuilder};
use crate::transport::Transport;
use crate::{JsonRpcError, Result};

impl PeerBuilder {
    /// Build the peer and start pumping messages between it and `transport` on a background task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn bind(self, transport: impl Transport) -> Connection {
        let graceful_shutdown_timeout = self.config.graceful_shutdown_timeout;
        let (peer, outbound) = self.build();
        Connection::spawn(peer, outbound, transport, graceful_shutdown_timeout)
    }
}

/// A [`Peer`] bound to a [`Transport`] by a running event loop.
///
/// Dropping this does not stop the event loop; it keeps running until the transport or the
/// cancellation token says otherwise.
pub struct Connection {
    peer: Peer,
    cancellation_token: CancellationToken,
    event_loop: JoinHandle<Result<()>>,
}

impl Connection {
    fn spawn(
        peer: Peer,
        outbound: Outbound,
        transport: impl Transport,
        graceful_shutdown_timeout: Option<Duration>,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let span = tracing::debug_span!("connection", remote_peer = %transport.remote_peer());
        let event_loop = EventLoop {
            peer: peer.clone(),
            outbound,
            transport,
            cancellation_token: cancellation_token.clone(),
            graceful_shutdown_timeout,
        };

        let event_loop = tokio::spawn(
            event_loop
                .run()
                .inspect(|result| match result {
                    Ok(()) | Err(JsonRpcError::Cancelled) => {}
                    Err(e) => tracing::error!("Event loop terminated due to an error: {}", e),
                })
                .instrument(span),
        );

        Self {
            peer,
            cancellation_token,
            event_loop,
        }
    }

    /// The peer this connection drives.  Clone it to make calls from other tasks.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// A clone of the cancellation token for this connection.
    ///
    /// Triggering it makes the event loop close the peer, rejecting any calls still waiting for a
    /// response, and stop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Cancel the event loop and wait for it to finish.
    ///
    /// Cancellation itself is not an error; the result is only an error if the event loop had
    /// already failed for some other reason.
    pub async fn shutdown(self) -> Result<()> {
        self.cancellation_token.cancel();
        match self.closed().await {
            Err(JsonRpcError::Cancelled) => Ok(()),
            result => result,
        }
    }

    /// Wait for the event loop to finish on its own, which happens when the remote peer closes the
    /// transport or the transport fails.
    pub async fn closed(self) -> Result<()> {
        match self.event_loop.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Event loop task panicked or was aborted");
                Err(JsonRpcError::Cancelled)
            }
        }
    }
}

struct EventLoop<T> {
    peer: Peer,
    outbound: Outbound,
    transport: T,
    cancellation_token: CancellationToken,
    graceful_shutdown_timeout: Option<Duration>,
}

impl<T: Transport> EventLoop<T> {
    async fn run(mut self) -> Result<()> {
        tracing::debug!("Event loop is starting");

        let result = loop {
            tokio::select! {
                message = self.outbound.next_message() => {
                    match message {
                        Some(message) => {
                            if let Err(e) = self.send(&message).await {
                                tracing::error!("Error sending message to peer: {}", e);
                                break Err(e);
                            }
                        }
                        None => {
                            // Something closed the peer directly
                            tracing::debug!("Peer closed; event loop terminating");
                            break Ok(());
                        }
                    }
                },
                received = self.transport.receive_message() => {
                    match received {
                        Ok(Some(text)) => self.peer.receive_text(&text),
                        Ok(None) => {
                            tracing::debug!("Remote peer closed connection; event loop terminating");
                            break Ok(());
                        }
                        Err(e) => {
                            tracing::error!("Error receiving message from peer: {}", e);
                            break Err(JsonRpcError::transport(e));
                        }
                    }
                },
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Cancellation signal received, shutting down connection");
                    break Err(JsonRpcError::Cancelled);
                }
            }
        };

        self.peer.close();

        // Whatever the peer queued before it closed, such as responses to requests that were
        // handled in time, still deserves to be sent.  Unless the transport is what failed.
        if !matches!(result, Err(JsonRpcError::Transport { .. })) {
            self.flush().await;
        }

        tracing::debug!(?result, "Event loop is exiting");
        result
    }

    async fn flush(&mut self) {
        let timeout = self.graceful_shutdown_timeout;
        let flush = async {
            let mut flushed = 0usize;
            while let Some(message) = self.outbound.next_message().await {
                if let Err(e) = self.send(&message).await {
                    tracing::debug!(error = %e, "Error flushing queued message; giving up");
                    break;
                }
                flushed += 1;
            }
            flushed
        };

        let flushed = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, flush).await {
                Ok(flushed) => flushed,
                Err(_) => {
                    tracing::warn!(?timeout, "Timed out flushing queued messages to peer");
                    return;
                }
            },
            None => flush.await,
        };
        tracing::trace!(flushed, "Flushed queued messages");
    }

    async fn send(&mut self, message: &serde_json::Value) -> Result<()> {
        let text = codec::encode(message)?;
        self.transport.send_message(text).await.map_err(JsonRpcError::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use crate::testing::{init_test_logging, setup_test_channel};
    use crate::types::JsonValue;
    use crate::{CallOptions, Dispatcher, shape};
    use assert_matches::assert_matches;
    use futures::{SinkExt, StreamExt};
    use serde_json::json;

    fn echo_dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_request_handler("echo", shape::raw(), |params| async move { Ok(params) })
            .unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn test_request_round_trip_over_transport() {
        init_test_logging();
        let (transport, (mut remote_rx, mut remote_tx)) = setup_test_channel();
        let connection = PeerBuilder::new().with_dispatcher(echo_dispatcher()).bind(transport);

        remote_tx
            .send(Ok(r#"{"jsonrpc":"2.0","method":"echo","params":[1,2],"id":1}"#.to_string()))
            .await
            .unwrap();
        let response: JsonValue = serde_json::from_str(&remote_rx.next().await.unwrap()).unwrap();
        assert_eq!(response, json!({"jsonrpc":"2.0","result":[1,2],"id":1}));

        remote_tx.send(Ok("garbage".to_string())).await.unwrap();
        let response: JsonValue = serde_json::from_str(&remote_rx.next().await.unwrap()).unwrap();
        assert_eq!(response["error"]["code"], json!(-32700));

        connection.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_close_rejects_pending_calls() {
        init_test_logging();
        let (transport, (mut remote_rx, remote_tx)) = setup_test_channel();
        let connection = PeerBuilder::new().bind(transport);

        let handle = connection
            .peer()
            .start_call("never", None, CallOptions::default())
            .unwrap();
        assert!(remote_rx.next().await.is_some());

        drop(remote_tx);

        assert_matches!(handle.await, Err(JsonRpcError::StreamClosed));
        assert!(connection.peer().is_closed());
        connection.closed().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_peer() {
        init_test_logging();
        let (transport, _remote) = setup_test_channel();
        let connection = PeerBuilder::new().bind(transport);
        let peer = connection.peer().clone();

        let handle = peer.start_call("never", None, CallOptions::default()).unwrap();
        connection.shutdown().await.unwrap();

        assert!(peer.is_closed());
        assert_matches!(handle.await, Err(JsonRpcError::StreamClosed));
        assert_matches!(
            peer.start_call("late", None, CallOptions::default()),
            Err(JsonRpcError::StreamClosed)
        );
    }

    #[tokio::test]
    async fn test_closing_peer_stops_event_loop() {
        init_test_logging();
        let (transport, _remote) = setup_test_channel();
        let connection = PeerBuilder::new().bind(transport);

        connection.peer().close();
        connection.closed().await.unwrap();
    }

    #[tokio::test]
    async fn test_queued_messages_are_flushed_on_close() {
        init_test_logging();
        let (transport, (mut remote_rx, _remote_tx)) = setup_test_channel();
        let config = PeerConfig {
            graceful_shutdown_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let connection = PeerBuilder::new().with_config(config).bind(transport);

        connection.peer().notify("one", None).unwrap();
        connection.peer().notify("two", None).unwrap();
        connection.peer().close();
        connection.closed().await.unwrap();

        let mut methods = Vec::new();
        while let Some(text) = remote_rx.next().await {
            let message: JsonValue = serde_json::from_str(&text).unwrap();
            methods.push(message["method"].as_str().unwrap().to_string());
        }
        assert_eq!(methods, vec!["one", "two"]);
    }
}
