//! Session state for one conversation

use serde::Serialize;
use uuid::Uuid;

use crate::turn::TurnRecord;

/// Unique identifier for a conversation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Mutable state of one conversation.
///
/// The last-acts buffer has one slot per participant for the whole
/// session. The turn count only grows and `episode_done` is never cleared.
#[derive(Debug)]
pub struct SessionState {
    /// Session ID
    pub id: SessionId,
    turns: u32,
    episode_done: bool,
    last_acts: Vec<TurnRecord>,
}

impl SessionState {
    /// Create state for `participants` seats
    pub fn new(participants: usize) -> Self {
        Self {
            id: SessionId::new(),
            turns: 0,
            episode_done: false,
            last_acts: vec![TurnRecord::sentinel(); participants],
        }
    }

    /// Start the next round and return its number (first round is 1)
    pub fn begin_round(&mut self) -> u32 {
        self.turns += 1;
        self.turns
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Store the latest act of seat `index`
    pub fn record_act(&mut self, index: usize, act: TurnRecord) {
        self.last_acts[index] = act;
    }

    pub fn last_acts(&self) -> &[TurnRecord] {
        &self.last_acts
    }

    /// Latest utterance text of every seat, in seat order
    pub fn last_texts(&self) -> Vec<&str> {
        self.last_acts.iter().map(|act| act.text.as_str()).collect()
    }

    pub fn mark_done(&mut self) {
        self.episode_done = true;
    }

    pub fn episode_done(&self) -> bool {
        self.episode_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let state = SessionState::new(3);
        assert_eq!(state.turns(), 0);
        assert!(!state.episode_done());
        assert_eq!(state.last_acts().len(), 3);
        assert!(state.last_acts().iter().all(|act| *act == TurnRecord::sentinel()));
    }

    #[test]
    fn test_rounds_and_acts() {
        let mut state = SessionState::new(2);

        assert_eq!(state.begin_round(), 1);
        state.record_act(1, TurnRecord::new("Chat Agent 2", "hi"));
        assert_eq!(state.last_texts(), vec!["", "hi"]);

        assert_eq!(state.begin_round(), 2);
        state.record_act(1, TurnRecord::new("Chat Agent 2", "bye"));
        assert_eq!(state.last_acts().len(), 2);
        assert_eq!(state.last_texts(), vec!["", "bye"]);
    }

    #[test]
    fn test_done_is_sticky() {
        let mut state = SessionState::new(1);
        state.mark_done();
        state.begin_round();
        assert!(state.episode_done());
    }
}
