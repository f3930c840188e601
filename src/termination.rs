//! Termination policy - decides when a conversation is over
//!
//! Pure logic, no I/O. After each round the session asks the policy
//! whether to stop. Two independent conditions end the episode:
//!
//! - the turn count reached `max_turns`, or
//! - the turn count reached `min_turns` and every participant's latest
//!   utterance is a bare goodbye (see [`is_goodbye`]).
//!
//! `min_turns` keeps an early stray "bye" from cutting a session short.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// "bye", any case, optional trailing `.`/`!`, surrounding whitespace, nothing else
static GOODBYE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?i:bye)[.!]*\s*$").unwrap());

/// Whether `text` is a bare goodbye
pub fn is_goodbye(text: &str) -> bool {
    GOODBYE.is_match(text)
}

/// Why a conversation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    /// Turn limit reached
    MaxTurns,
    /// Everyone said goodbye after the minimum number of turns
    AllSaidGoodbye,
    /// A participant flagged its turn as the end of the episode
    ParticipantEnded { participant: String },
    /// A timeout-capable participant did not act in time
    TurnTimeout { participant: String },
    /// A participant failed (transport error, disconnect)
    ParticipantFailed { participant: String, error: String },
}

/// Turn limits for one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    pub max_turns: u32,
    pub min_turns: u32,
}

impl TerminationPolicy {
    pub fn new(max_turns: u32, min_turns: u32) -> Self {
        Self {
            max_turns,
            min_turns,
        }
    }

    /// Decide whether the episode ends after a round.
    ///
    /// `utterances` holds each participant's text from the round just played.
    pub fn evaluate<S: AsRef<str>>(&self, turns: u32, utterances: &[S]) -> Option<EndReason> {
        if turns >= self.max_turns {
            return Some(EndReason::MaxTurns);
        }

        let all_said_goodbye = utterances.iter().all(|text| is_goodbye(text.as_ref()));
        if all_said_goodbye && turns >= self.min_turns {
            return Some(EndReason::AllSaidGoodbye);
        }

        None
    }
}
