//! Helpers for testing the JSON RPC implementation.
//!
//! This module is only compiled when `test` is enabled.  Integration tests pull it in with a
//! `#[path]` attribute.
#![allow(dead_code)]

use futures::channel::mpsc;

/// The transport half of [`setup_test_channel`], to be bound to a peer
pub type TestTransport = (
    mpsc::UnboundedReceiver<Result<String, std::io::Error>>,
    mpsc::UnboundedSender<String>,
);

/// The remote half of [`setup_test_channel`]: what the peer sent, and a way to send it things
pub type TestRemote = (
    mpsc::UnboundedReceiver<String>,
    mpsc::UnboundedSender<Result<String, std::io::Error>>,
);

/// Initialize tracing with a subscriber and some reasonable defaults suitable for enabling log
/// output in tests.
///
/// This is idempotent; it can be called from multiple tests in multiple threads but will only
/// initialize tracing once.
pub fn init_test_logging() {
    use std::sync::OnceLock;

    const DEFAULT_LOG_FILTER: &str = "trace";
    static INIT_LOGGING: OnceLock<()> = OnceLock::new();

    INIT_LOGGING.get_or_init(|| {
        // Another test harness may have beaten us to it, which is fine
        let _ = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
            .with_test_writer()
            .try_init();
    });
}

/// An in-memory transport, along with the remote end of it.
///
/// Whatever the peer sends shows up on the remote receiver as message text, and whatever is sent
/// on the remote sender is received by the peer.  Dropping the remote sender looks to the peer
/// like the remote peer closing the connection.
pub fn setup_test_channel() -> (TestTransport, TestRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded();
    let (outbound_tx, outbound_rx) = mpsc::unbounded();

    ((inbound_rx, outbound_tx), (outbound_rx, inbound_tx))
}

/// Two transports connected to each other, for wiring two peers together.
pub fn setup_test_pair() -> (TestTransport, TestTransport) {
    let (a_tx, a_rx) = mpsc::unbounded::<String>();
    let (b_tx, b_rx) = mpsc::unbounded::<String>();

    // Each side's outbound text becomes the other side's inbound
    let (a_in_tx, a_in_rx) = mpsc::unbounded();
    let (b_in_tx, b_in_rx) = mpsc::unbounded();
    tokio::spawn(forward(a_rx, b_in_tx));
    tokio::spawn(forward(b_rx, a_in_tx));

    ((a_in_rx, a_tx), (b_in_rx, b_tx))
}

async fn forward(
    mut from: mpsc::UnboundedReceiver<String>,
    to: mpsc::UnboundedSender<Result<String, std::io::Error>>,
) {
    use futures::StreamExt;

    while let Some(message) = from.next().await {
        if to.unbounded_send(Ok(message)).is_err() {
            break;
        }
    }
}
