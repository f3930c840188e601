//! Participant capability interface
//!
//! Every conversational party, human or automated, in-process or remote,
//! is driven through [`Participant`]. Bounded waits are an optional
//! capability: implementations that cannot honour a timeout keep the
//! default methods, which report [`RoundtableError::TimeoutUnsupported`]
//! so callers can fall back to the unbounded call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoundtableError};
use crate::turn::TurnRecord;

/// Identity of a crowd worker as handed over by the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Worker name as registered with the platform
    pub worker_name: String,
    /// Durable id of this worker's unit of work
    pub unit_id: String,
    /// Assignment id passed through the query string, if any
    pub assignment_id: Option<String>,
}

impl WorkerIdentity {
    pub fn new(worker_name: impl Into<String>, unit_id: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
            unit_id: unit_id.into(),
            assignment_id: None,
        }
    }

    pub fn with_assignment(mut self, assignment_id: impl Into<String>) -> Self {
        self.assignment_id = Some(assignment_id.into());
        self
    }

    /// Code the worker types into the completion form.
    ///
    /// The deployment tag keeps codes unique across parallel deployments.
    pub fn completion_code(&self, deployment_instance: &str) -> String {
        format!("{}{}", self.unit_id, deployment_instance)
    }
}

/// Who is behind a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantRole {
    /// A human worker
    Worker(WorkerIdentity),
    /// An automated chatbot, registered under `registered_name`
    Bot { registered_name: String },
}

impl ParticipantRole {
    pub fn bot(registered_name: impl Into<String>) -> Self {
        Self::Bot {
            registered_name: registered_name.into(),
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Self::Bot { .. })
    }

    /// Name under which the participant is recorded
    pub fn registered_name(&self) -> &str {
        match self {
            Self::Worker(identity) => &identity.worker_name,
            Self::Bot { registered_name } => registered_name,
        }
    }
}

/// A conversational party
#[async_trait]
pub trait Participant: Send + Sync {
    /// Display id stamped on this participant's turns
    fn id(&self) -> String;

    fn role(&self) -> &ParticipantRole;

    /// Called once with the participant's seat label (`Chat Agent N`).
    /// Participants that keep their own display id ignore it.
    fn assign_label(&self, label: &str) {
        let _ = label;
    }

    /// Whether [`Participant::act_with_timeout`] is implemented
    fn supports_timeout(&self) -> bool {
        false
    }

    /// Deliver another participant's turn
    async fn observe(&self, message: &TurnRecord) -> Result<()>;

    /// Produce the next turn, waiting as long as it takes
    async fn act(&self) -> Result<TurnRecord>;

    /// Produce the next turn within `timeout`
    async fn act_with_timeout(&self, timeout: Duration) -> Result<TurnRecord> {
        let _ = timeout;
        Err(RoundtableError::TimeoutUnsupported(self.id()))
    }

    /// Release the participant's resources
    async fn shutdown(&self) -> Result<()>;

    /// Release resources, waiting at most `timeout` (`None` waits indefinitely)
    async fn shutdown_with_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let _ = timeout;
        Err(RoundtableError::TimeoutUnsupported(self.id()))
    }
}
