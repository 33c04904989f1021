//! Results of a sync attempt

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a sync trigger did not start a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadySyncing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Offline => write!(f, "offline"),
            SkipReason::AlreadySyncing => write!(f, "already syncing"),
        }
    }
}

/// Tally of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Actions in the snapshot
    pub attempted: usize,
    /// Handler wrote to the remote store; action removed
    pub applied: usize,
    /// Remote already held the mutation (conflict or no-op); action removed
    pub already_applied: usize,
    /// Transient failure; action left queued for the next pass
    pub deferred: usize,
    pub quarantined: usize,
    pub discarded: usize,
    /// Terminal failure left queued under the retain policy
    pub retained: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl DrainReport {
    /// Actions that left the pending queue during the pass
    pub fn removed(&self) -> usize {
        self.applied + self.already_applied + self.quarantined + self.discarded
    }

    /// Actions still pending from the snapshot
    pub fn remaining(&self) -> usize {
        self.deferred + self.retained
    }
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted: {} applied, {} already applied, {} deferred, {} quarantined, {} discarded, {} retained in {:?}",
            self.attempted,
            self.applied,
            self.already_applied,
            self.deferred,
            self.quarantined,
            self.discarded,
            self.retained,
            self.elapsed
        )
    }
}

/// Result of [`SyncManager::sync`](super::SyncManager::sync)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped { reason: SkipReason },
    Completed(DrainReport),
}

impl SyncOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        SyncOutcome::Skipped { reason }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped { .. })
    }

    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}

/// Failure history of an action that is still pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDiagnostics {
    pub failures: u32,
    pub last_error: String,
    pub last_attempt: DateTime<Utc>,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
