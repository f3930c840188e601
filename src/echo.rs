//! Echo participant - an in-process bot that repeats what it observed

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::participant::{Participant, ParticipantRole};
use crate::turn::{TurnRecord, NOTHING_TO_REPLY};

const ECHO_PREFIX: &str = "[ echo ] :: ";

/// Bot that answers every turn with the last text it observed
pub struct EchoParticipant {
    id: String,
    role: ParticipantRole,
    observation: RwLock<Option<TurnRecord>>,
}

impl EchoParticipant {
    pub fn new(registered_name: impl Into<String>) -> Self {
        Self {
            id: "EchoParticipant".to_string(),
            role: ParticipantRole::bot(registered_name),
            observation: RwLock::new(None),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[async_trait]
impl Participant for EchoParticipant {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn role(&self) -> &ParticipantRole {
        &self.role
    }

    async fn observe(&self, message: &TurnRecord) -> Result<()> {
        *self.observation.write() = Some(message.clone());
        Ok(())
    }

    async fn act(&self) -> Result<TurnRecord> {
        let text = match self.observation.read().as_ref() {
            Some(observed) => format!("{ECHO_PREFIX}{}", observed.text),
            None => NOTHING_TO_REPLY.to_string(),
        };
        Ok(TurnRecord::new(self.id.clone(), text))
    }

    async fn shutdown(&self) -> Result<()> {
        self.observation.write().take();
        Ok(())
    }
}
