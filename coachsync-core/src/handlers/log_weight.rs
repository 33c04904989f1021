//! Weight logging handler
//!
//! Each weight row carries the id of the action that produced it, and the
//! remote enforces uniqueness on that column. The handler also looks the id
//! up first, so a replay after a lost acknowledgement writes nothing.

use super::errors::{HandlerError, HandlerResult};
use super::traits::{ActionHandler, ApplyOutcome};
use super::wrong_payload;
use crate::model::{ActionKind, ActionPayload, OfflineAction};
use crate::remote::{RemoteStore, WeightRecord, WEIGHT_RECORD_TYPE};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct LogWeightHandler {
    remote: Arc<dyn RemoteStore>,
}

impl LogWeightHandler {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl ActionHandler for LogWeightHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::LogWeight
    }

    async fn apply(&self, action: &OfflineAction) -> HandlerResult<ApplyOutcome> {
        let payload = match &action.payload {
            ActionPayload::LogWeight(p) => p,
            _ => return Err(wrong_payload(self.kind(), action)),
        };
        action.payload.validate().map_err(HandlerError::Validation)?;

        if self.remote.find_weight_by_client_id(&action.id).await?.is_some() {
            return Err(HandlerError::ConflictAlreadyApplied(format!(
                "weight for action {} already stored",
                action.id
            )));
        }

        let record = WeightRecord {
            user_id: action.user_id.clone(),
            record_type: WEIGHT_RECORD_TYPE.to_string(),
            value: payload.value,
            unit: payload.unit,
            date: payload.date,
            client_action_id: action.id.clone(),
        };
        self.remote.insert_weight(&record).await?;

        debug!(action_id = %action.id, value = payload.value, date = %payload.date, "Weight logged");
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryRemoteStore, RemoteError, RemoteOp};
    use crate::test_utils::{meal_log_action, weight_action};

    fn setup() -> (Arc<InMemoryRemoteStore>, LogWeightHandler) {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let handler = LogWeightHandler::new(remote.clone());
        (remote, handler)
    }

    #[tokio::test]
    async fn test_inserts_weight_record() {
        let (remote, handler) = setup();
        let action = weight_action("u1", 82.5);

        let outcome = handler.apply(&action).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        let weights = remote.weights();
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].value, 82.5);
        assert_eq!(weights[0].record_type, "weight");
        assert_eq!(weights[0].client_action_id, action.id);
    }

    #[tokio::test]
    async fn test_replay_is_already_applied() {
        let (remote, handler) = setup();
        let action = weight_action("u1", 82.5);

        handler.apply(&action).await.unwrap();
        let err = handler.apply(&action).await.unwrap_err();

        assert!(err.is_already_applied());
        assert_eq!(remote.weights().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_weight_is_terminal() {
        let (remote, handler) = setup();
        let action = weight_action("u1", 0.0);

        let err = handler.apply(&action).await.unwrap_err();

        assert!(err.is_terminal());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_payload_is_rejected() {
        let (_remote, handler) = setup();
        let err = handler
            .apply(&meal_log_action("u1", "item-1", true))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_network_failure_is_transient() {
        let (remote, handler) = setup();
        remote.inject_failure(
            RemoteOp::InsertWeight,
            1,
            RemoteError::Unavailable("503".into()),
        );

        let err = handler.apply(&weight_action("u1", 70.0)).await.unwrap_err();
        assert!(matches!(err, HandlerError::TransientNetwork(_)));
        assert!(remote.weights().is_empty());
    }
}
