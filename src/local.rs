//! Local participant - a human worker reached through in-process channels

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::channel::{ChannelPair, ParticipantChannel};
use crate::error::{Result, RoundtableError};
use crate::participant::{Participant, ParticipantRole, WorkerIdentity};
use crate::turn::TurnRecord;

/// A human worker taking part in the conversation
pub struct LocalParticipant {
    /// Display id, replaced by the seat label once seated
    id: RwLock<String>,
    identity: WorkerIdentity,
    role: ParticipantRole,
    /// `None` after shutdown
    delivery_tx: Mutex<Option<mpsc::UnboundedSender<TurnRecord>>>,
    reply_rx: AsyncMutex<mpsc::UnboundedReceiver<TurnRecord>>,
}

impl LocalParticipant {
    /// Create a participant over an existing channel pair
    pub fn new(identity: WorkerIdentity, channels: ChannelPair) -> Self {
        info!(
            worker = %identity.worker_name,
            unit_id = %identity.unit_id,
            "Creating local participant"
        );

        Self {
            id: RwLock::new(identity.worker_name.clone()),
            role: ParticipantRole::Worker(identity.clone()),
            identity,
            delivery_tx: Mutex::new(Some(channels.delivery_tx)),
            reply_rx: AsyncMutex::new(channels.reply_rx),
        }
    }

    /// Create a participant and return the client end of its channels
    pub fn with_channel(identity: WorkerIdentity) -> (Self, ParticipantChannel) {
        let (channel, pair) = ParticipantChannel::new();
        (Self::new(identity, pair), channel)
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    fn close_delivery(&self) {
        if self.delivery_tx.lock().take().is_some() {
            debug!(participant = %self.id(), "Closed delivery channel");
        }
    }
}

#[async_trait]
impl Participant for LocalParticipant {
    fn id(&self) -> String {
        self.id.read().clone()
    }

    fn role(&self) -> &ParticipantRole {
        &self.role
    }

    fn assign_label(&self, label: &str) {
        *self.id.write() = label.to_string();
    }

    fn supports_timeout(&self) -> bool {
        true
    }

    async fn observe(&self, message: &TurnRecord) -> Result<()> {
        let guard = self.delivery_tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| RoundtableError::Disconnected(self.id()))?;
        tx.send(message.clone())
            .map_err(|_| RoundtableError::Disconnected(self.id()))
    }

    async fn act(&self) -> Result<TurnRecord> {
        let mut reply = self
            .reply_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| RoundtableError::Disconnected(self.id()))?;
        reply.id = self.id();
        Ok(reply)
    }

    async fn act_with_timeout(&self, timeout: Duration) -> Result<TurnRecord> {
        tokio::time::timeout(timeout, self.act())
            .await
            .map_err(|_| RoundtableError::TurnTimeout {
                participant: self.id(),
                timeout,
            })?
    }

    async fn shutdown(&self) -> Result<()> {
        self.close_delivery();
        Ok(())
    }

    /// Close delivery, then wait for the client to hang up.
    async fn shutdown_with_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.close_delivery();

        let hang_up = async {
            let mut rx = self.reply_rx.lock().await;
            while let Some(late) = rx.recv().await {
                debug!(participant = %self.id(), text = %late.text, "Discarding reply after shutdown");
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, hang_up).await.map_err(|_| {
                warn!(participant = %self.id(), ?limit, "Client did not hang up in time");
                RoundtableError::Participant(format!(
                    "{} did not hang up within {limit:?}",
                    self.id()
                ))
            }),
            None => {
                hang_up.await;
                Ok(())
            }
        }
    }
}
