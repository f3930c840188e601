//! Session configuration
//!
//! Loaded from a JSON file (every field is optional), then overridden by
//! `ROUNDTABLE_*` environment variables, then validated before any session
//! state exists.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RoundtableError};
use crate::termination::TerminationPolicy;

/// Where to find the remote chatbot and how to present it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub host: String,
    pub port: u16,
    /// Display id on the bot's turns
    pub screen_name: String,
    /// Name the bot is registered under in the persistence sink
    pub registered_name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 35496,
            screen_name: "Bot".to_string(),
            registered_name: "ECHO".to_string(),
        }
    }
}

/// Settings for one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_turns: u32,
    /// Goodbyes are ignored before this many rounds
    pub min_turns: u32,
    /// Bounded wait for participants that support one
    pub turn_timeout_secs: u64,
    /// Bound on each participant's shutdown; `None` waits indefinitely
    pub shutdown_timeout_secs: Option<u64>,
    /// Attach round bookkeeping to every turn
    pub send_task_data: bool,
    /// Appended to unit ids to form completion codes
    pub deployment_instance: String,
    pub bot: BotConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 5,
            min_turns: 2,
            turn_timeout_secs: 300,
            shutdown_timeout_secs: Some(30),
            send_task_data: false,
            deployment_instance: String::new(),
            bot: BotConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded session config");
        Ok(config)
    }

    /// Apply `ROUNDTABLE_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ROUNDTABLE_BOT_HOST") {
            self.bot.host = host;
        }
        if let Some(port) = lookup("ROUNDTABLE_BOT_PORT") {
            self.bot.port = parse_override("ROUNDTABLE_BOT_PORT", &port)?;
        }
        if let Some(max) = lookup("ROUNDTABLE_MAX_TURNS") {
            self.max_turns = parse_override("ROUNDTABLE_MAX_TURNS", &max)?;
        }
        if let Some(min) = lookup("ROUNDTABLE_MIN_TURNS") {
            self.min_turns = parse_override("ROUNDTABLE_MIN_TURNS", &min)?;
        }
        if let Some(instance) = lookup("ROUNDTABLE_INSTANCE") {
            self.deployment_instance = instance;
        }
        Ok(())
    }

    /// Reject settings a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            return Err(RoundtableError::Config("max_turns must be at least 1".into()));
        }
        if self.min_turns > self.max_turns {
            return Err(RoundtableError::Config(format!(
                "min_turns ({}) exceeds max_turns ({})",
                self.min_turns, self.max_turns
            )));
        }
        if self.turn_timeout_secs == 0 {
            return Err(RoundtableError::Config("turn_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }

    pub fn termination_policy(&self) -> TerminationPolicy {
        TerminationPolicy::new(self.max_turns, self.min_turns)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RoundtableError::Config(format!("{key} has invalid value {value:?}")))
}
