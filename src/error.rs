//! Roundtable error types

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors that can occur while running a conversation
#[derive(Debug, Error)]
pub enum RoundtableError {
    /// The remote chatbot could not be reached at session start
    #[error("Failed to connect to chatbot at <{addr}>, maybe wrong host or port? ({source})")]
    RemoteUnavailable {
        addr: String,
        #[source]
        source: tungstenite::Error,
    },

    /// A remote bridge was used without a socket handle
    #[error("Remote participant {0} is not connected")]
    NotConnected(String),

    /// The remote connection was closed earlier and cannot be reused
    #[error("Connection to remote participant {0} is closed")]
    ConnectionClosed(String),

    /// Send or receive failed on an established connection
    #[error("Transport failure for {participant}: {source}")]
    Transport {
        participant: String,
        #[source]
        source: tungstenite::Error,
    },

    /// The remote side sent something that is not a JSON object with text
    #[error("Malformed reply from {participant}: {source}")]
    MalformedReply {
        participant: String,
        #[source]
        source: serde_json::Error,
    },

    /// Bounded wait requested from a participant that has none
    #[error("Participant {0} does not support bounded waits")]
    TimeoutUnsupported(String),

    /// A timeout-capable participant did not act in time
    #[error("Participant {participant} did not act within {timeout:?}")]
    TurnTimeout {
        participant: String,
        timeout: Duration,
    },

    /// The client side of a local participant hung up
    #[error("Participant {0} disconnected")]
    Disconnected(String),

    /// Persistence sink error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Participant-specific failure
    #[error("Participant error: {0}")]
    Participant(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RoundtableError {
    /// Whether this error means the remote participant is gone for good
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ConnectionClosed(_) | Self::NotConnected(_)
        )
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, RoundtableError>;
