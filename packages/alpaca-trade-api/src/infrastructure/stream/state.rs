//! Connection State Machine
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Authenticating ──▶ Ready ──▶ Closing ──▶ Closed
//!      ▲               │                │              │
//!      └───────────────┴────────────────┴──────────────┘
//!                   failure (reconnect scheduled)
//! ```

use std::fmt;

/// Lifecycle state of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Auth frame sent, waiting for the reply.
    Authenticating,
    /// Authenticated; frames are being consumed.
    Ready,
    /// Shutting down.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Stable numeric index, used for the state gauge.
    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Authenticating => 2,
            Self::Ready => 3,
            Self::Closing => 4,
            Self::Closed => 5,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Whether the connection can carry subscribe frames.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Authenticating, Closed, Closing, Connecting, Disconnected, Ready};
        matches!(
            (self, next),
            (Disconnected, Connecting | Disconnected | Closing)
                | (Connecting, Authenticating | Disconnected | Closing)
                | (Authenticating, Ready | Disconnected | Closing)
                | (Ready, Disconnected | Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::ConnectionState::{self, *};

    #[test_case(Disconnected, Connecting, true)]
    #[test_case(Connecting, Authenticating, true)]
    #[test_case(Authenticating, Ready, true)]
    #[test_case(Ready, Disconnected, true)]
    #[test_case(Ready, Closing, true)]
    #[test_case(Closing, Closed, true)]
    #[test_case(Disconnected, Ready, false)]
    #[test_case(Closed, Connecting, false)]
    #[test_case(Ready, Authenticating, false)]
    fn transitions(from: ConnectionState, to: ConnectionState, legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn indices_are_ordered() {
        let states = [Disconnected, Connecting, Authenticating, Ready, Closing, Closed];
        for (i, state) in states.iter().enumerate() {
            assert_eq!(usize::from(state.as_index()), i);
        }
        assert_eq!(Ready.to_string(), "ready");
    }
}
