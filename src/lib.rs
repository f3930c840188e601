//! # Roundtable
//!
//! Turn-based conversation sessions between human workers and chatbots.
//!
//! A session seats its participants in a fixed order and plays rounds:
//! each participant acts once per round, and every turn is shown to all
//! other participants before the next one acts. The conversation ends on
//! a turn limit, a unanimous goodbye, or a participant leaving.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ORCHESTRATOR                            │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌───────────────────┐   │
//! │  │ Session State│  │Termination Policy│  │ Persistence Sink  │   │
//! │  └──────────────┘  └──────────────────┘  └───────────────────┘   │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ observe / act
//!          ┌──────────────────────┼──────────────────────┐
//!          ▼                      ▼                      ▼
//!   ┌─────────────┐       ┌──────────────┐       ┌──────────────┐
//!   │   Local     │       │ Remote Bridge│       │    Echo      │
//!   │ (channels)  │       │ (websocket)  │       │ (in-process) │
//!   └─────────────┘       └──────────────┘       └──────────────┘
//!                                 │
//!                    ┌────────────┴────────────┐
//!                    ▼                         ▼
//!            completion notices      Shutdown Coordinator
//! ```
//!
//! ## Key Concepts
//!
//! - **Participant**: anything that can observe turns and take one
//! - **Turn**: one act, relayed to every other participant
//! - **Round**: every participant acting once, in seat order
//! - **Session**: one conversation, from assembly to shutdown

pub mod channel;
pub mod config;
pub mod echo;
pub mod error;
pub mod local;
pub mod logging;
pub mod orchestrator;
pub mod participant;
pub mod persistence;
pub mod remote;
pub mod session;
pub mod shutdown;
pub mod termination;
pub mod turn;

#[cfg(test)]
mod testutil;

pub use channel::{ChannelPair, ParticipantChannel};
pub use config::{BotConfig, SessionConfig};
pub use echo::EchoParticipant;
pub use error::{Result, RoundtableError};
pub use local::LocalParticipant;
pub use orchestrator::{Orchestrator, Phase, SessionOutcome};
pub use participant::{Participant, ParticipantRole, WorkerIdentity};
pub use persistence::{MemorySink, PersistenceSink};
pub use remote::RemoteBridge;
pub use session::{SessionId, SessionState};
pub use shutdown::{shutdown_all, ShutdownSummary};
pub use termination::{EndReason, TerminationPolicy};
pub use turn::{TaskData, TurnRecord};
