//! In-process channels between a local participant and its client
//!
//! The session side holds a [`ChannelPair`]; whatever front end the human
//! uses (a terminal, a web socket handler, a test) holds the
//! [`ParticipantChannel`].

use tokio::sync::mpsc;

use crate::turn::TurnRecord;

/// Session-side half of a local participant's channels
pub struct ChannelPair {
    /// Replies typed by the human
    pub reply_rx: mpsc::UnboundedReceiver<TurnRecord>,
    /// Messages shown to the human
    pub delivery_tx: mpsc::UnboundedSender<TurnRecord>,
}

/// Client-side channel for a human participant
pub struct ParticipantChannel {
    reply_tx: mpsc::UnboundedSender<TurnRecord>,
    delivery_rx: mpsc::UnboundedReceiver<TurnRecord>,
}

impl ParticipantChannel {
    /// Create a new channel pair
    ///
    /// Returns the client channel and the session-side pair
    pub fn new() -> (Self, ChannelPair) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        let channel = Self {
            reply_tx,
            delivery_rx,
        };

        let pair = ChannelPair {
            reply_rx,
            delivery_tx,
        };

        (channel, pair)
    }

    /// Send an utterance for the participant's next turn
    pub fn say(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.send(TurnRecord::text(text))
    }

    /// Send a final utterance that ends the episode
    pub fn leave(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.send(TurnRecord::text(text).with_episode_done(true))
    }

    /// Send a prepared turn
    pub fn send(&self, turn: TurnRecord) -> Result<(), ChannelError> {
        self.reply_tx.send(turn).map_err(|_| ChannelError::Closed)
    }

    /// Try to receive a delivered message (non-blocking)
    pub fn try_recv(&mut self) -> Option<TurnRecord> {
        self.delivery_rx.try_recv().ok()
    }

    /// Wait for the next delivered message; `None` once the session closed delivery
    pub async fn recv(&mut self) -> Option<TurnRecord> {
        self.delivery_rx.recv().await
    }

    /// Everything delivered so far
    pub fn drain(&mut self) -> Vec<TurnRecord> {
        let mut messages = Vec::new();
        while let Ok(message) = self.delivery_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Check if the session stopped listening for replies
    pub fn is_closed(&self) -> bool {
        self.reply_tx.is_closed()
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,
}
