//! Session controller - drives one conversation from first turn to shutdown
//!
//! Every round each seat acts once, in seat order. A turn is relayed to
//! every other seat before the next seat acts, so each participant has
//! seen all earlier turns when its own turn comes. After the round the
//! termination policy decides whether to stop. On the way out workers get
//! a completion notice, bots get the done signal, and everyone is shut
//! down in parallel.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::SessionConfig;
use crate::error::{Result, RoundtableError};
use crate::participant::{Participant, ParticipantRole};
use crate::persistence::{
    normalize_agent_name, AgentRecordId, AgentType, ConversationAgentLink, ConversationRecordId,
    PersistenceSink,
};
use crate::remote::{send_done, RemoteBridge};
use crate::session::{SessionId, SessionState};
use crate::shutdown::{shutdown_all, ShutdownSummary};
use crate::termination::{EndReason, TerminationPolicy};
use crate::turn::{completion_notice, TaskData, TurnRecord};

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    Running,
    Terminating,
    Closed,
}

/// A participant's place at the table
pub struct Seat {
    /// `Chat Agent N`, by seat order
    pub label: String,
    pub participant: Arc<dyn Participant>,
    agent_id: Option<AgentRecordId>,
    utterances: u32,
}

impl Seat {
    /// Durable id from the persistence sink, once registered
    pub fn agent_id(&self) -> Option<AgentRecordId> {
        self.agent_id
    }

    /// Turns this seat has taken
    pub fn utterances(&self) -> u32 {
        self.utterances
    }
}

/// Result of a finished conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub conversation_id: Option<ConversationRecordId>,
    pub turns: u32,
    pub reason: EndReason,
    pub shutdown: ShutdownSummary,
}

/// Drives a single conversation
pub struct Orchestrator {
    config: SessionConfig,
    policy: TerminationPolicy,
    seats: Vec<Seat>,
    state: SessionState,
    phase: Phase,
    end_reason: Option<EndReason>,
    sink: Arc<dyn PersistenceSink>,
    conversation_id: Option<ConversationRecordId>,
}

impl Orchestrator {
    /// Seat `participants` in the given order. Nothing is recorded yet.
    pub fn new(
        config: SessionConfig,
        participants: Vec<Arc<dyn Participant>>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Result<Self> {
        config.validate()?;
        if participants.is_empty() {
            return Err(RoundtableError::Config(
                "a conversation needs at least one participant".into(),
            ));
        }

        let seats: Vec<Seat> = participants
            .into_iter()
            .enumerate()
            .map(|(index, participant)| {
                let label = format!("Chat Agent {}", index + 1);
                participant.assign_label(&label);
                Seat {
                    label,
                    participant,
                    agent_id: None,
                    utterances: 0,
                }
            })
            .collect();

        let state = SessionState::new(seats.len());
        info!(session_id = %state.id, participants = seats.len(), "Created session");

        Ok(Self {
            policy: config.termination_policy(),
            config,
            seats,
            state,
            phase: Phase::Initialized,
            end_reason: None,
            sink,
            conversation_id: None,
        })
    }

    /// Seat the participants and record them with the persistence sink
    pub async fn start(
        config: SessionConfig,
        participants: Vec<Arc<dyn Participant>>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Result<Self> {
        let mut orchestrator = Self::new(config, participants, sink)?;
        orchestrator.register().await?;
        Ok(orchestrator)
    }

    /// Build a session for the workers the platform matched.
    ///
    /// Two workers talk to each other, the most recent arrival first. A
    /// single worker is paired with the remote chatbot, which speaks first.
    pub async fn assemble(
        config: SessionConfig,
        mut workers: Vec<Arc<dyn Participant>>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Result<Self> {
        config.validate()?;

        match workers.len() {
            1 => {
                let bot = RemoteBridge::open(
                    &config.bot.host,
                    config.bot.port,
                    &config.bot.screen_name,
                    &config.bot.registered_name,
                )
                .await?;
                workers.insert(0, Arc::new(bot));
            }
            2 => workers.swap(0, 1),
            n => {
                return Err(RoundtableError::Config(format!(
                    "there should only ever be one or two workers in a conversation, found {n}"
                )))
            }
        }

        Self::start(config, workers, sink).await
    }

    /// Register agents, the conversation and the links between them
    async fn register(&mut self) -> Result<()> {
        for seat in &mut self.seats {
            let role = seat.participant.role();
            let agent_type = if role.is_bot() {
                AgentType::Bot
            } else {
                AgentType::Worker
            };
            let name = normalize_agent_name(role.registered_name());
            let agent_id = self.sink.record_agent(&name, agent_type).await?;

            info!(participant = %seat.label, name = %name, agent_id = agent_id.0, "Registered participant");
            seat.agent_id = Some(agent_id);
        }

        let settings = serde_json::to_value(&self.config)?;
        let conversation_id = self.sink.record_conversation(&settings).await?;

        for seat in &self.seats {
            let Some(agent_id) = seat.agent_id else {
                continue;
            };
            let (unit_id, assignment_id) = match seat.participant.role() {
                ParticipantRole::Worker(identity) => (
                    Some(identity.completion_code(&self.config.deployment_instance)),
                    identity.assignment_id.clone(),
                ),
                ParticipantRole::Bot { .. } => (None, None),
            };
            self.sink
                .link_conversation_agent(&ConversationAgentLink {
                    conversation_id,
                    agent_id,
                    unit_id,
                    assignment_id,
                })
                .await?;
        }

        info!(conversation_id = conversation_id.0, "Recorded conversation");
        self.conversation_id = Some(conversation_id);
        Ok(())
    }

    pub fn id(&self) -> SessionId {
        self.state.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn episode_done(&self) -> bool {
        self.state.episode_done()
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    pub fn conversation_id(&self) -> Option<ConversationRecordId> {
        self.conversation_id
    }

    /// Play one round. Returns why the conversation ended, if it did.
    #[instrument(skip(self), fields(session_id = %self.state.id))]
    pub async fn parley(&mut self) -> Option<EndReason> {
        if let Some(reason) = &self.end_reason {
            return Some(reason.clone());
        }

        self.phase = Phase::Running;
        let round = self.state.begin_round();
        debug!(round, "Starting round");

        let mut ended_by: Option<String> = None;
        for index in 0..self.seats.len() {
            let label = self.seats[index].label.clone();

            let mut act = match self.request_act(index).await {
                Ok(act) => act,
                Err(err) => return Some(self.end(failure_reason(&label, &err))),
            };

            if self.config.send_task_data {
                act.set_task_data(TaskData::new(label.clone(), round, index));
            }
            self.record_utterance(index, &act).await;

            if let Err((other, err)) = self.relay(index, &act).await {
                return Some(self.end(failure_reason(&other, &err)));
            }

            let speaker_done = act.episode_done;
            self.state.record_act(index, act);
            self.seats[index].utterances += 1;

            // the rest of the round still plays out
            if speaker_done {
                self.state.mark_done();
                if ended_by.is_none() {
                    info!(participant = %label, round, "Participant ended the conversation");
                    ended_by = Some(label);
                }
            }
        }

        let verdict = self.policy.evaluate(round, &self.state.last_texts());
        if let Some(participant) = ended_by {
            if let Some(reason) = &verdict {
                debug!(?reason, "Termination policy agreed");
            }
            return Some(self.end(EndReason::ParticipantEnded { participant }));
        }
        Some(self.end(verdict?))
    }

    /// Ask seat `index` for its turn, bounded when it supports that
    async fn request_act(&self, index: usize) -> Result<TurnRecord> {
        let participant = &self.seats[index].participant;
        if !participant.supports_timeout() {
            return participant.act().await;
        }

        match participant.act_with_timeout(self.config.turn_timeout()).await {
            Err(RoundtableError::TimeoutUnsupported(_)) => {
                debug!(participant = %self.seats[index].label, "No bounded act, waiting without limit");
                participant.act().await
            }
            other => other,
        }
    }

    /// Show seat `index`'s turn to everyone else, in seat order
    async fn relay(
        &self,
        index: usize,
        act: &TurnRecord,
    ) -> std::result::Result<(), (String, RoundtableError)> {
        for (other, seat) in self.seats.iter().enumerate() {
            if other == index {
                continue;
            }
            seat.participant
                .observe(act)
                .await
                .map_err(|err| (seat.label.clone(), err))?;
        }
        Ok(())
    }

    async fn record_utterance(&self, index: usize, act: &TurnRecord) {
        let seat = &self.seats[index];
        let (Some(conversation_id), Some(agent_id)) = (self.conversation_id, seat.agent_id) else {
            return;
        };

        match self
            .sink
            .record_utterance(conversation_id, agent_id, &act.text)
            .await
        {
            Ok(()) => debug!(participant = %seat.label, text = %act.text, "Recorded utterance"),
            Err(e) => warn!(participant = %seat.label, error = %e, "Failed to record utterance"),
        }
    }

    fn end(&mut self, reason: EndReason) -> EndReason {
        self.state.mark_done();
        self.phase = Phase::Terminating;
        info!(turns = self.state.turns(), reason = ?reason, "Conversation over");
        self.end_reason = Some(reason.clone());
        reason
    }

    /// Send every seat its closing message
    pub async fn conclude(&self) {
        for seat in &self.seats {
            let result = match seat.participant.role() {
                ParticipantRole::Bot { .. } => send_done(seat.participant.as_ref()).await,
                ParticipantRole::Worker(identity) => {
                    let code = identity.completion_code(&self.config.deployment_instance);
                    seat.participant
                        .observe(&TurnRecord::coordinator(completion_notice(&code)))
                        .await
                }
            };

            if let Err(e) = result {
                warn!(participant = %seat.label, error = %e, "Failed to deliver closing message");
            }
        }
    }

    /// Run rounds until the conversation ends, then notify and shut down
    #[instrument(skip(self), fields(session_id = %self.state.id))]
    pub async fn run(mut self) -> SessionOutcome {
        info!(participants = self.seats.len(), "Starting conversation");

        let reason = loop {
            if let Some(reason) = self.parley().await {
                break reason;
            }
        };

        self.conclude().await;

        let participants: Vec<Arc<dyn Participant>> = self
            .seats
            .iter()
            .map(|seat| Arc::clone(&seat.participant))
            .collect();
        let shutdown = shutdown_all(&participants, self.config.shutdown_timeout()).await;
        self.phase = Phase::Closed;

        info!(turns = self.state.turns(), "Conversation closed");

        SessionOutcome {
            session_id: self.state.id,
            conversation_id: self.conversation_id,
            turns: self.state.turns(),
            reason,
            shutdown,
        }
    }
}

fn failure_reason(participant: &str, err: &RoundtableError) -> EndReason {
    match err {
        RoundtableError::TurnTimeout { .. } => {
            warn!(participant, error = %err, "Participant timed out");
            EndReason::TurnTimeout {
                participant: participant.to_string(),
            }
        }
        _ => {
            error!(participant, error = %err, "Participant failed");
            EndReason::ParticipantFailed {
                participant: participant.to_string(),
                error: err.to_string(),
            }
        }
    }
}
