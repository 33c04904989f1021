//! Action Queue Store trait
//!
//! Defines the interface for persisting pending offline actions.

use super::errors::StorageResult;
use crate::model::{ActionId, OfflineAction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An action parked after a terminal failure, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedAction {
    pub action: OfflineAction,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Durable FIFO store of pending offline actions
///
/// Implementations must ensure:
/// - Each record is written or deleted atomically (no whole-list rewrites),
///   so an `enqueue` from the UI can interleave with a `remove_action` from a
///   drain without losing or duplicating records
/// - Reads reflect durable state, not a cache
/// - Records are never mutated once enqueued
#[async_trait]
pub trait ActionQueueStore: Send + Sync {
    /// Persist one action at the tail of the queue.
    ///
    /// Fails only on genuine storage failure. Enqueueing an id that is
    /// already stored is a no-op.
    async fn enqueue(&self, action: &OfflineAction) -> StorageResult<()>;

    /// Ordered snapshot of every pending action, oldest first
    async fn get_pending_actions(&self) -> StorageResult<Vec<OfflineAction>>;

    /// Remove an action. Removing an unknown id is a no-op.
    async fn remove_action(&self, id: &ActionId) -> StorageResult<()>;

    /// Number of pending actions
    async fn pending_count(&self) -> StorageResult<usize> {
        Ok(self.get_pending_actions().await?.len())
    }

    /// Atomically move a pending action into quarantine.
    ///
    /// Unknown ids are ignored.
    async fn quarantine_action(&self, id: &ActionId, reason: &str) -> StorageResult<()>;

    /// Every quarantined action, oldest quarantine first
    async fn get_quarantined_actions(&self) -> StorageResult<Vec<QuarantinedAction>>;

    /// Move a quarantined action back to the tail of the pending queue.
    ///
    /// Returns `false` if no quarantined action has that id.
    async fn requeue_quarantined(&self, id: &ActionId) -> StorageResult<bool>;
}
