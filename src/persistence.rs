//! Persistence sink - where agents, conversations and utterances are recorded
//!
//! The storage engine behind the sink is not this crate's business. The
//! session issues one write per event, in the order the events happen.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RoundtableError};

/// Durable id of a registered agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentRecordId(pub i64);

/// Durable id of a recorded conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationRecordId(pub i64);

/// Kind of agent being registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Worker,
    Bot,
}

impl AgentType {
    /// Single-letter code stored in the agent table
    pub fn code(self) -> char {
        match self {
            Self::Worker => 'w',
            Self::Bot => 'c',
        }
    }
}

/// Row tying a participant to a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAgentLink {
    pub conversation_id: ConversationRecordId,
    pub agent_id: AgentRecordId,
    /// Worker's unit id with the deployment tag; `None` for bots
    pub unit_id: Option<String>,
    pub assignment_id: Option<String>,
}

/// Strip platform decorations from a worker name before it is stored
pub fn normalize_agent_name(name: &str) -> String {
    let name = name.strip_suffix("_sandbox").unwrap_or(name);
    name.replace("worker_id=", "")
}

/// Receives structured records of a conversation
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Register an agent by name, reusing the id of an existing one
    async fn record_agent(&self, name: &str, agent_type: AgentType) -> Result<AgentRecordId>;

    /// Create a conversation row holding the session settings
    async fn record_conversation(&self, settings: &Value) -> Result<ConversationRecordId>;

    async fn record_utterance(
        &self,
        conversation: ConversationRecordId,
        agent: AgentRecordId,
        text: &str,
    ) -> Result<()>;

    async fn link_conversation_agent(&self, link: &ConversationAgentLink) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRow {
    pub id: AgentRecordId,
    pub name: String,
    pub agent_type: AgentType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceRow {
    pub conversation_id: ConversationRecordId,
    pub agent_id: AgentRecordId,
    pub content: String,
}

#[derive(Debug, Default)]
struct MemoryTables {
    agents: Vec<AgentRow>,
    conversations: Vec<(ConversationRecordId, Value)>,
    utterances: Vec<UtteranceRow>,
    links: Vec<ConversationAgentLink>,
}

/// In-memory sink, for tests and for runs without a database
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<MemoryTables>,
    reject_utterances: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every utterance write
    pub fn rejecting_utterances() -> Self {
        Self {
            reject_utterances: true,
            ..Self::default()
        }
    }

    pub fn agents(&self) -> Vec<AgentRow> {
        self.tables.lock().agents.clone()
    }

    pub fn conversations(&self) -> Vec<(ConversationRecordId, Value)> {
        self.tables.lock().conversations.clone()
    }

    pub fn utterances(&self) -> Vec<UtteranceRow> {
        self.tables.lock().utterances.clone()
    }

    pub fn links(&self) -> Vec<ConversationAgentLink> {
        self.tables.lock().links.clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn record_agent(&self, name: &str, agent_type: AgentType) -> Result<AgentRecordId> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.agents.iter().find(|row| row.name == name) {
            return Ok(existing.id);
        }

        let id = AgentRecordId(tables.agents.len() as i64 + 1);
        tables.agents.push(AgentRow {
            id,
            name: name.to_string(),
            agent_type,
        });
        Ok(id)
    }

    async fn record_conversation(&self, settings: &Value) -> Result<ConversationRecordId> {
        let mut tables = self.tables.lock();
        let id = ConversationRecordId(tables.conversations.len() as i64 + 1);
        tables.conversations.push((id, settings.clone()));
        Ok(id)
    }

    async fn record_utterance(
        &self,
        conversation: ConversationRecordId,
        agent: AgentRecordId,
        text: &str,
    ) -> Result<()> {
        if self.reject_utterances {
            return Err(RoundtableError::Persistence("utterance table unavailable".into()));
        }
        self.tables.lock().utterances.push(UtteranceRow {
            conversation_id: conversation,
            agent_id: agent,
            content: text.to_string(),
        });
        Ok(())
    }

    async fn link_conversation_agent(&self, link: &ConversationAgentLink) -> Result<()> {
        self.tables.lock().links.push(link.clone());
        Ok(())
    }
}
