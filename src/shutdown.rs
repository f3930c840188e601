//! Shutdown coordination - tear participants down in parallel
//!
//! One task per participant, so a worker who never hangs up cannot keep
//! the others from being released. Failures are logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Result, RoundtableError};
use crate::participant::Participant;

/// How the teardown went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Shut a single participant down, preferring the bounded call
async fn shutdown_participant(
    participant: &dyn Participant,
    timeout: Option<Duration>,
) -> Result<()> {
    if !participant.supports_timeout() {
        return participant.shutdown().await;
    }

    match participant.shutdown_with_timeout(timeout).await {
        Err(RoundtableError::TimeoutUnsupported(_)) => {
            debug!(participant = %participant.id(), "Falling back to unbounded shutdown");
            participant.shutdown().await
        }
        other => other,
    }
}

/// Shut every participant down concurrently and wait for all of them
pub async fn shutdown_all(
    participants: &[Arc<dyn Participant>],
    timeout: Option<Duration>,
) -> ShutdownSummary {
    let mut tasks = JoinSet::new();

    for participant in participants {
        let participant = Arc::clone(participant);
        tasks.spawn(async move {
            let id = participant.id();
            let result = shutdown_participant(participant.as_ref(), timeout).await;
            (id, result)
        });
    }

    let mut summary = ShutdownSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(()))) => {
                debug!(participant = %id, "Participant shut down");
                summary.completed += 1;
            }
            Ok((id, Err(e))) => {
                warn!(participant = %id, error = %e, "Participant shutdown failed");
                summary.failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "Participant shutdown task aborted");
                summary.failed += 1;
            }
        }
    }

    info!(
        completed = summary.completed,
        failed = summary.failed,
        "Shutdown complete"
    );
    summary
}
