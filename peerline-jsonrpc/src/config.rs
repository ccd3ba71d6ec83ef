use std::time::Duration;

/// Tunables for a [`crate::Peer`] and the [`crate::Connection`] driving it.
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Timeout applied to outbound calls whose [`CallOptions`] don't specify one.
    ///
    /// `None` indicates no limit; such calls wait until the remote peer responds or the peer is
    /// closed.
    pub default_call_timeout: Option<Duration>,

    /// How many timed-out request ids to remember, so that a response arriving after its call
    /// timed out is quietly dropped instead of reported as unexpected.
    ///
    /// Once the limit is reached the oldest id is forgotten first.  A response to a forgotten id
    /// is reported like any other unexpected response.
    pub max_expired_call_ids: usize,

    /// After a connection's event loop stops, how long to keep writing messages that were already
    /// queued for the remote peer before giving up on them.
    ///
    /// `None` indicates no limit, which is probably not a good idea.
    pub graceful_shutdown_timeout: Option<Duration>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            default_call_timeout: None,
            max_expired_call_ids: 1024,
            graceful_shutdown_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Options for a single outbound call.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Reject the call with a timeout error if no response arrives within this long.
    ///
    /// Overrides [`PeerConfig::default_call_timeout`].
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}
