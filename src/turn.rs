//! Turn records - what a participant says on its turn

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sender id used for messages written by the session itself
pub const COORDINATOR_ID: &str = "Coordinator";

/// Text returned by automated participants that have not observed anything yet
pub const NOTHING_TO_REPLY: &str = "Nothing to reply to yet";

/// Out-of-band text telling a remote participant the episode is over
pub const DONE_SIGNAL: &str = "[DONE]";

/// Round-scoped bookkeeping attached to a turn when task data is enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    /// Seat label of the participant that produced the turn
    pub last_acting_agent: String,
    /// Round number, starting at 1
    pub current_dialogue_turn: u32,
    /// Round number plus the speaker's seat ordinal
    pub utterance_count: u32,
}

impl TaskData {
    pub fn new(label: impl Into<String>, round: u32, ordinal: usize) -> Self {
        Self {
            last_acting_agent: label.into(),
            current_dialogue_turn: round,
            utterance_count: round + ordinal as u32,
        }
    }
}

/// One act of one participant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Speaker id
    #[serde(default)]
    pub id: String,
    /// Utterance text
    #[serde(default)]
    pub text: String,
    /// Speaker wants the episode to end
    #[serde(default)]
    pub episode_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_data: Option<TaskData>,
    /// Anything else the speaker attached (e.g. `role` for remote replies)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TurnRecord {
    /// A plain text turn from `id`
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// A turn carrying only text, used for protocol messages
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(String::new(), text)
    }

    /// A message from the session coordinator
    pub fn coordinator(text: impl Into<String>) -> Self {
        Self::new(COORDINATOR_ID, text)
    }

    /// Empty slot in the last-acts buffer before a seat has spoken
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn with_episode_done(mut self, done: bool) -> Self {
        self.episode_done = done;
        self
    }

    /// Replace task data, whatever the speaker put there
    pub fn set_task_data(&mut self, data: TaskData) {
        self.task_data = Some(data);
    }

    /// `role` tag if one was attached
    pub fn role(&self) -> Option<&str> {
        self.extra.get("role").and_then(Value::as_str)
    }
}

/// Notice shown to a worker when the conversation is over.
///
/// The `CODE:` line is read by the downstream survey and must stay stable.
pub fn completion_notice(code: &str) -> String {
    format!(
        "You are done with the conversation.\n\n\
         Please carefully type the following code into the below input box \
         and continue with the rest of the survey.\n\n\
         CODE: {code}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_count_increases_with_ordinal() {
        let counts: Vec<u32> = (0..3)
            .map(|i| TaskData::new(format!("Chat Agent {}", i + 1), 4, i).utterance_count)
            .collect();
        assert_eq!(counts, vec![4, 5, 6]);
    }

    #[test]
    fn test_extra_fields_survive_deserialization() {
        let record: TurnRecord =
            serde_json::from_str(r#"{"text": "hello", "emotion": "joy"}"#).unwrap();
        assert_eq!(record.text, "hello");
        assert!(!record.episode_done);
        assert_eq!(record.extra.get("emotion"), Some(&Value::from("joy")));
    }

    #[test]
    fn test_completion_notice_embeds_code() {
        let notice = completion_notice("unit-42sandbox-1");
        assert!(notice.ends_with("CODE: unit-42sandbox-1"));
    }
}
