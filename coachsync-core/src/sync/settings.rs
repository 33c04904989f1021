//! Sync manager settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What to do with an action whose handler failed terminally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPolicy {
    /// Move it out of the pending queue into quarantine
    Quarantine,
    /// Remove it from the queue
    Discard,
    /// Leave it queued; it will be attempted again every pass
    Retain,
}

impl TerminalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalPolicy::Quarantine => "quarantine",
            TerminalPolicy::Discard => "discard",
            TerminalPolicy::Retain => "retain",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quarantine" => Some(TerminalPolicy::Quarantine),
            "discard" => Some(TerminalPolicy::Discard),
            "retain" => Some(TerminalPolicy::Retain),
            _ => None,
        }
    }
}

impl Default for TerminalPolicy {
    fn default() -> Self {
        TerminalPolicy::Quarantine
    }
}

impl fmt::Display for TerminalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Upper bound on a single handler call; elapsing counts as a transient failure
    pub handler_timeout: Duration,
    pub terminal_policy: TerminalPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(30),
            terminal_policy: TerminalPolicy::default(),
        }
    }
}

impl SyncSettings {
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_terminal_policy(mut self, policy: TerminalPolicy) -> Self {
        self.terminal_policy = policy;
        self
    }
}
