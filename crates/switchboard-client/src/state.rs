//! Connection state machine states.

use std::fmt;
use std::time::Duration;

/// Where the client is in its connect/backoff cycle.
///
/// `Failed` and `Closed` are terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Not started, or between a drop and the backoff decision.
    Disconnected,
    /// Transport connect and handshake in progress.
    Connecting {
        /// Consecutive failed attempts before this one.
        attempt: u32,
    },
    /// Handshake complete; commands flow.
    Connected,
    /// Waiting before the next attempt.
    Backoff {
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
        /// Why the last connection ended.
        reason: String,
    },
    /// Gave up; the application must restart the client.
    Failed {
        /// Why the client gave up.
        reason: String,
    },
    /// Shut down by the application.
    Closed,
}

impl ClientState {
    /// Whether the client has stopped for good.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Closed)
    }

    /// Whether commands are currently sent immediately.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            Self::Connected => f.write_str("connected"),
            Self::Backoff { delay, reason, .. } => {
                write!(f, "reconnecting in {}ms ({reason})", delay.as_millis())
            }
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Closed => f.write_str("closed"),
        }
    }
}
