//! In-Memory Action Queue Store
//!
//! Process-lifetime implementation, used by tests and as a fallback when no
//! data directory is configured.

use super::errors::{StorageError, StorageResult};
use super::traits::{ActionQueueStore, QuarantinedAction};
use crate::model::{ActionId, OfflineAction};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    pending: VecDeque<OfflineAction>,
    quarantined: Vec<QuarantinedAction>,
}

impl Inner {
    fn contains(&self, id: &ActionId) -> bool {
        self.pending.iter().any(|a| &a.id == id)
            || self.quarantined.iter().any(|q| &q.action.id == id)
    }
}

/// In-memory action queue
pub struct MemoryActionStore {
    inner: RwLock<Inner>,
    reject_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryActionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            reject_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Make subsequent enqueues fail with [`StorageError::WriteRejected`]
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent snapshot reads fail, as an unreadable database would
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryActionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionQueueStore for MemoryActionStore {
    async fn enqueue(&self, action: &OfflineAction) -> StorageResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("store is read-only".to_string()));
        }

        let mut inner = self.inner.write().await;
        if !inner.contains(&action.id) {
            inner.pending.push_back(action.clone());
            crate::metrics::record_enqueued();
        }
        Ok(())
    }

    async fn get_pending_actions(&self) -> StorageResult<Vec<OfflineAction>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Database("store is unreadable".to_string()));
        }
        let inner = self.inner.read().await;
        Ok(inner.pending.iter().cloned().collect())
    }

    async fn remove_action(&self, id: &ActionId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.pending.retain(|a| &a.id != id);
        Ok(())
    }

    async fn pending_count(&self) -> StorageResult<usize> {
        Ok(self.inner.read().await.pending.len())
    }

    async fn quarantine_action(&self, id: &ActionId, reason: &str) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(pos) = inner.pending.iter().position(|a| &a.id == id) {
            if let Some(action) = inner.pending.remove(pos) {
                inner.quarantined.push(QuarantinedAction {
                    action,
                    reason: reason.to_string(),
                    quarantined_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    async fn get_quarantined_actions(&self) -> StorageResult<Vec<QuarantinedAction>> {
        Ok(self.inner.read().await.quarantined.clone())
    }

    async fn requeue_quarantined(&self, id: &ActionId) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.quarantined.iter().position(|q| &q.action.id == id) {
            Some(pos) => {
                let entry = inner.quarantined.remove(pos);
                inner.pending.push_back(entry.action);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
