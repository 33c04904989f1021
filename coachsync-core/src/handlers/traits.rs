//! Action handler trait

use super::errors::HandlerResult;
use crate::model::{ActionKind, OfflineAction};
use async_trait::async_trait;

/// What a successful handler run did remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// At least one remote write happened
    Applied,
    /// Remote state already matched the action; nothing was written
    NoOp,
}

/// Applies one kind of offline action to the remote store
///
/// Implementations must be idempotent: a crash may happen after the remote
/// write succeeded but before the action left the queue, so the same action
/// can be applied again.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Kind of action this handler applies
    fn kind(&self) -> ActionKind;

    /// Apply the action to the remote store
    async fn apply(&self, action: &OfflineAction) -> HandlerResult<ApplyOutcome>;
}
