//! Custom meal handler
//!
//! Two independent remote writes:
//! 1. insert the meal definition under the client-generated id; a primary
//!    key conflict means an earlier attempt already created it
//! 2. link the meal into its plan, after checking membership, because step 1
//!    may have succeeded on an attempt whose step 2 did not

use super::errors::{HandlerError, HandlerResult};
use super::traits::{ActionHandler, ApplyOutcome};
use super::wrong_payload;
use crate::model::{ActionKind, ActionPayload, OfflineAction};
use crate::remote::{MealDefinition, RemoteError, RemoteStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct AddCustomMealHandler {
    remote: Arc<dyn RemoteStore>,
}

impl AddCustomMealHandler {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl ActionHandler for AddCustomMealHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::AddCustomMeal
    }

    async fn apply(&self, action: &OfflineAction) -> HandlerResult<ApplyOutcome> {
        let payload = match &action.payload {
            ActionPayload::AddCustomMeal(p) => p,
            _ => return Err(wrong_payload(self.kind(), action)),
        };
        action.payload.validate().map_err(HandlerError::Validation)?;

        let meal = MealDefinition {
            id: payload.meal_id.clone(),
            owner_id: action.user_id.clone(),
            name: payload.name.clone(),
            calories: payload.calories,
            protein_g: payload.protein_g,
            carbs_g: payload.carbs_g,
            fat_g: payload.fat_g,
            notes: payload.notes.clone(),
            is_custom: true,
        };

        let created = match self.remote.insert_meal(&meal).await {
            Ok(()) => true,
            Err(RemoteError::UniqueViolation(_)) => {
                debug!(action_id = %action.id, meal_id = %meal.id, "Meal already exists");
                false
            }
            Err(e) => return Err(e.into()),
        };

        let members = self.remote.plan_meal_ids(&payload.meal_plan_id).await?;
        let linked = if members.contains(&payload.meal_id) {
            false
        } else {
            self.remote
                .add_meal_to_plan(&payload.meal_plan_id, &payload.meal_id)
                .await?;
            true
        };

        if !created && !linked {
            return Err(HandlerError::ConflictAlreadyApplied(format!(
                "meal {} already created and linked into plan {}",
                payload.meal_id, payload.meal_plan_id
            )));
        }

        debug!(
            action_id = %action.id,
            meal_id = %payload.meal_id,
            plan_id = %payload.meal_plan_id,
            created,
            linked,
            "Custom meal applied"
        );
        Ok(ApplyOutcome::Applied)
    }
}
