//! Test fixtures for offline actions
//!
//! Factory functions for the common cases and a builder when a test needs to
//! pin the id, the user or the creation time.

use crate::model::{
    ActionId, ActionPayload, AddCustomMealPayload, LogMealPayload, LogWeightPayload, MealId,
    MealPlanId, MealPlanItemId, OfflineAction, UserId, WeightUnit,
};
use chrono::{DateTime, NaiveDate, Utc};

/// Plan used by fixtures that do not name one
pub const TEST_PLAN: &str = "plan-1";

/// Date used by weight fixtures
pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default()
}

/// Weight entry in kilograms for [`test_date`]
pub fn weight_action(user: &str, value: f64) -> OfflineAction {
    OfflineAction::log_weight(UserId::new(user), value, WeightUnit::Kg, test_date())
}

/// Consumed / not-consumed toggle for `item` in [`TEST_PLAN`]
pub fn meal_log_action(user: &str, item: &str, consumed: bool) -> OfflineAction {
    OfflineAction::log_meal(
        UserId::new(user),
        LogMealPayload {
            meal_plan_id: MealPlanId::new(TEST_PLAN),
            meal_plan_item_id: MealPlanItemId::new(item),
            meal_name: "Breakfast".to_string(),
            consumed,
            notes: None,
            actual_time: None,
        },
    )
}

/// Custom meal with a fresh client-side meal id
pub fn custom_meal_action(user: &str, plan: &str, name: &str) -> OfflineAction {
    OfflineAction::add_custom_meal(
        UserId::new(user),
        AddCustomMealPayload {
            meal_id: MealId::generate(),
            meal_plan_id: MealPlanId::new(plan),
            name: name.to_string(),
            calories: Some(420),
            protein_g: Some(18.0),
            carbs_g: Some(55.0),
            fat_g: Some(12.0),
            notes: None,
        },
    )
}

/// A custom meal followed by a log entry for that meal
///
/// The log refers to the meal through its plan item id, so it only makes
/// sense remotely once the meal exists.
pub fn custom_meal_then_log(user: &str, plan: &str) -> (OfflineAction, OfflineAction) {
    let create = custom_meal_action(user, plan, "Protein pancakes");
    let meal_id = match &create.payload {
        ActionPayload::AddCustomMeal(p) => p.meal_id.clone(),
        _ => MealId::generate(),
    };
    let log = OfflineAction::log_meal(
        UserId::new(user),
        LogMealPayload {
            meal_plan_id: MealPlanId::new(plan),
            meal_plan_item_id: MealPlanItemId::new(meal_id.as_str()),
            meal_name: "Protein pancakes".to_string(),
            consumed: true,
            notes: None,
            actual_time: None,
        },
    );
    (create, log)
}

/// Builder for actions with pinned fields
pub struct TestActionBuilder {
    id: Option<ActionId>,
    user: UserId,
    created_at: Option<DateTime<Utc>>,
    retry_count: Option<u32>,
    payload: ActionPayload,
}

impl TestActionBuilder {
    pub fn weight(value: f64) -> Self {
        Self::with_payload(ActionPayload::LogWeight(LogWeightPayload {
            value,
            unit: WeightUnit::Kg,
            date: test_date(),
        }))
    }

    pub fn meal_log(item: &str, consumed: bool) -> Self {
        let payload = meal_log_action("u1", item, consumed).payload;
        Self::with_payload(payload)
    }

    pub fn custom_meal(plan: &str, name: &str) -> Self {
        let payload = custom_meal_action("u1", plan, name).payload;
        Self::with_payload(payload)
    }

    pub fn with_payload(payload: ActionPayload) -> Self {
        Self {
            id: None,
            user: UserId::new("u1"),
            created_at: None,
            retry_count: None,
            payload,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(ActionId::new(id));
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = UserId::new(user);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn build(self) -> OfflineAction {
        let mut action = OfflineAction::new(self.user, self.payload);
        if let Some(id) = self.id {
            action.id = id;
        }
        if let Some(created_at) = self.created_at {
            action.created_at = created_at;
        }
        action.retry_count = self.retry_count;
        action
    }
}
