//! Meal logging handler
//!
//! A meal log is keyed by (user, meal plan item, day). The day is taken from
//! the action's `created_at` in the configured offset, so an action recorded
//! late on Monday and synced on Tuesday still lands on Monday.
//!
//! | consumed | existing log | effect            |
//! |----------|--------------|-------------------|
//! | true     | none         | insert            |
//! | true     | present      | update, or no-op  |
//! | false    | present      | delete            |
//! | false    | none         | no-op             |

use super::errors::{HandlerError, HandlerResult};
use super::traits::{ActionHandler, ApplyOutcome};
use super::wrong_payload;
use crate::model::{ActionKind, ActionPayload, LogMealPayload, OfflineAction};
use crate::remote::{MealLog, RemoteError, RemoteStore};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use std::sync::Arc;
use tracing::debug;

pub struct LogMealHandler {
    remote: Arc<dyn RemoteStore>,
    day_offset: FixedOffset,
}

impl LogMealHandler {
    pub fn new(remote: Arc<dyn RemoteStore>, day_offset: FixedOffset) -> Self {
        Self { remote, day_offset }
    }

    /// Day bucket the action belongs to
    pub fn target_day(&self, action: &OfflineAction) -> NaiveDate {
        action.created_at.with_timezone(&self.day_offset).date_naive()
    }

    fn desired_log(&self, action: &OfflineAction, payload: &LogMealPayload, day: NaiveDate) -> MealLog {
        MealLog {
            user_id: action.user_id.clone(),
            meal_plan_id: payload.meal_plan_id.clone(),
            meal_plan_item_id: payload.meal_plan_item_id.clone(),
            meal_name: payload.meal_name.clone(),
            date: day,
            consumed: true,
            notes: payload.notes.clone(),
            actual_time: Some(payload.actual_time.unwrap_or(action.created_at)),
        }
    }
}

#[async_trait]
impl ActionHandler for LogMealHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::LogMeal
    }

    async fn apply(&self, action: &OfflineAction) -> HandlerResult<ApplyOutcome> {
        let payload = match &action.payload {
            ActionPayload::LogMeal(p) => p,
            _ => return Err(wrong_payload(self.kind(), action)),
        };
        action.payload.validate().map_err(HandlerError::Validation)?;

        let day = self.target_day(action);
        let existing = self
            .remote
            .find_meal_log(&action.user_id, &payload.meal_plan_item_id, day)
            .await?;

        let outcome = match (payload.consumed, existing) {
            (true, None) => {
                let log = self.desired_log(action, payload, day);
                let id = self.remote.insert_meal_log(&log).await?;
                debug!(action_id = %action.id, log_id = %id, %day, "Meal log inserted");
                ApplyOutcome::Applied
            }
            (true, Some(stored)) => {
                let log = self.desired_log(action, payload, day);
                if stored.log == log {
                    ApplyOutcome::NoOp
                } else {
                    match self.remote.update_meal_log(&stored.id, &log).await {
                        Ok(()) => {
                            debug!(action_id = %action.id, log_id = %stored.id, %day, "Meal log updated");
                        }
                        // Deleted between lookup and update; write it fresh
                        Err(RemoteError::NotFound(_)) => {
                            let id = self.remote.insert_meal_log(&log).await.map_err(|e| match e {
                                RemoteError::UniqueViolation(msg) => HandlerError::TransientNetwork(
                                    format!("meal log changed during sync: {}", msg),
                                ),
                                other => other.into(),
                            })?;
                            debug!(action_id = %action.id, log_id = %id, %day, "Meal log reinserted");
                        }
                        Err(e) => return Err(e.into()),
                    }
                    ApplyOutcome::Applied
                }
            }
            (false, Some(stored)) => match self.remote.delete_meal_log(&stored.id).await {
                Ok(()) => {
                    debug!(action_id = %action.id, log_id = %stored.id, %day, "Meal log deleted");
                    ApplyOutcome::Applied
                }
                // Deleted between lookup and delete; the end state is what we want
                Err(RemoteError::NotFound(_)) => ApplyOutcome::NoOp,
                Err(e) => return Err(e.into()),
            },
            (false, None) => ApplyOutcome::NoOp,
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MealPlanId, MealPlanItemId, UserId};
    use crate::remote::{InMemoryRemoteStore, RemoteOp};
    use crate::test_utils::{meal_log_action, weight_action};
    use chrono::{TimeZone, Utc};

    fn setup(offset_hours: i32) -> (Arc<InMemoryRemoteStore>, LogMealHandler) {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        let handler = LogMealHandler::new(remote.clone(), offset);
        (remote, handler)
    }

    fn existing_log(user: &str, item: &str, day: NaiveDate) -> MealLog {
        MealLog {
            user_id: UserId::new(user),
            meal_plan_id: MealPlanId::new("plan-1"),
            meal_plan_item_id: MealPlanItemId::new(item),
            meal_name: "Breakfast".to_string(),
            date: day,
            consumed: true,
            notes: None,
            actual_time: None,
        }
    }

    #[tokio::test]
    async fn test_consumed_without_existing_inserts() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", true);

        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::Applied);

        let logs = remote.meal_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log.date, action.created_at.date_naive());
        assert_eq!(logs[0].log.actual_time, Some(action.created_at));
    }

    #[tokio::test]
    async fn test_replay_of_insert_is_noop() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", true);

        handler.apply(&action).await.unwrap();
        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::NoOp);
        assert_eq!(remote.meal_logs().len(), 1);
        assert_eq!(remote.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_consumed_with_existing_updates() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", true);
        let id = remote.seed_meal_log(existing_log("u1", "item-1", action.created_at.date_naive()));

        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::Applied);

        let logs = remote.meal_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, id);
        assert_eq!(logs[0].log.actual_time, Some(action.created_at));
    }

    #[tokio::test]
    async fn test_unconsumed_with_existing_deletes() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", false);
        remote.seed_meal_log(existing_log("u1", "item-1", action.created_at.date_naive()));

        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::Applied);
        assert!(remote.meal_logs().is_empty());
    }

    #[tokio::test]
    async fn test_unconsumed_without_existing_is_noop() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", false);

        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::NoOp);
        assert_eq!(remote.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_day_comes_from_created_at_not_now() {
        let (remote, handler) = setup(0);
        let recorded = Utc.with_ymd_and_hms(2023, 12, 31, 23, 55, 0).unwrap();
        let action = meal_log_action("u1", "item-1", true).with_created_at(recorded);

        handler.apply(&action).await.unwrap();

        let logs = remote.meal_logs();
        assert_eq!(logs[0].log.date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[tokio::test]
    async fn test_day_respects_offset() {
        // 23:30 UTC is already the next day at UTC+2
        let (_remote, handler) = setup(2);
        let recorded = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
        let action = meal_log_action("u1", "item-1", true).with_created_at(recorded);

        assert_eq!(
            handler.target_day(&action),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete_race_is_noop() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", false);
        remote.seed_meal_log(existing_log("u1", "item-1", action.created_at.date_naive()));
        remote.inject_failure(
            RemoteOp::DeleteMealLog,
            1,
            RemoteError::NotFound("gone".into()),
        );

        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::NoOp);
    }

    #[tokio::test]
    async fn test_update_race_is_retried_not_rejected() {
        let (remote, handler) = setup(0);
        let action = meal_log_action("u1", "item-1", true);
        let id = remote.seed_meal_log(existing_log("u1", "item-1", action.created_at.date_naive()));
        remote.inject_failure(
            RemoteOp::UpdateMealLog,
            1,
            RemoteError::NotFound(format!("meal log {}", id)),
        );

        // The log reappeared under the same key, so the pass backs off
        let err = handler.apply(&action).await.unwrap_err();
        assert!(!err.is_terminal());
        assert!(matches!(err, HandlerError::TransientNetwork(_)));
        assert_eq!(remote.meal_logs().len(), 1);

        assert_eq!(handler.apply(&action).await.unwrap(), ApplyOutcome::Applied);
        let logs = remote.meal_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log.actual_time, Some(action.created_at));
    }

    #[tokio::test]
    async fn test_second_insert_for_same_day_is_unique_violation() {
        let (remote, _handler) = setup(0);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        remote.seed_meal_log(existing_log("u1", "item-1", day));

        let err = remote
            .insert_meal_log(&existing_log("u1", "item-1", day))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_wrong_payload_is_rejected() {
        let (_remote, handler) = setup(0);
        let err = handler.apply(&weight_action("u1", 80.0)).await.unwrap_err();
        assert!(err.is_terminal());
    }
}
