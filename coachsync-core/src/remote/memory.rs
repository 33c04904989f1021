//! In-memory remote store
//!
//! Enforces the same uniqueness rules as the hosted database (weight
//! `client_action_id`, meal primary key) and supports fault injection, so
//! handler idempotency and drain isolation can be exercised without a
//! network.

use super::errors::{RemoteError, RemoteResult};
use super::traits::{MealDefinition, MealLog, RemoteStore, StoredMealLog, WeightRecord};
use crate::model::{ActionId, MealId, MealPlanId, MealPlanItemId, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Remote operations, used for fault rules and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FindWeight,
    InsertWeight,
    FindMealLog,
    InsertMealLog,
    UpdateMealLog,
    DeleteMealLog,
    InsertMeal,
    PlanMeals,
    AddMealToPlan,
}

impl RemoteOp {
    fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteOp::InsertWeight
                | RemoteOp::InsertMealLog
                | RemoteOp::UpdateMealLog
                | RemoteOp::DeleteMealLog
                | RemoteOp::InsertMeal
                | RemoteOp::AddMealToPlan
        )
    }
}

struct FaultRule {
    op: RemoteOp,
    remaining: usize,
    error: RemoteError,
}

#[derive(Default)]
struct State {
    weights: Vec<WeightRecord>,
    meal_logs: HashMap<String, MealLog>,
    next_log_id: u64,
    meals: HashMap<MealId, MealDefinition>,
    plan_members: HashMap<MealPlanId, Vec<MealId>>,
    faults: Vec<FaultRule>,
    forbidden_users: HashSet<UserId>,
    calls: Vec<RemoteOp>,
    mutations: usize,
}

impl State {
    /// Record the call and consume a matching fault rule, if any
    fn begin(&mut self, op: RemoteOp) -> RemoteResult<()> {
        self.calls.push(op);
        if let Some(rule) = self.faults.iter_mut().find(|r| r.op == op && r.remaining > 0) {
            rule.remaining -= 1;
            let error = rule.error.clone();
            self.faults.retain(|r| r.remaining > 0);
            return Err(error);
        }
        Ok(())
    }

    fn check_user(&self, user_id: &UserId) -> RemoteResult<()> {
        if self.forbidden_users.contains(user_id) {
            return Err(RemoteError::Forbidden(format!(
                "user {} may not write this row",
                user_id
            )));
        }
        Ok(())
    }

    fn mutated(&mut self, op: RemoteOp) {
        if op.is_write() {
            self.mutations += 1;
        }
    }
}

/// Remote store kept entirely in process memory
pub struct InMemoryRemoteStore {
    state: Mutex<State>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            latency: Mutex::new(None),
        }
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Make the next `times` calls of `op` fail with `error`
    pub fn inject_failure(&self, op: RemoteOp, times: usize, error: RemoteError) {
        if times == 0 {
            return;
        }
        self.state.lock().faults.push(FaultRule {
            op,
            remaining: times,
            error,
        });
    }

    /// Reject every write made on behalf of `user_id`
    pub fn forbid_user(&self, user_id: UserId) {
        self.state.lock().forbidden_users.insert(user_id);
    }

    /// Seed a meal log as if it had been written by another session
    pub fn seed_meal_log(&self, log: MealLog) -> String {
        let mut state = self.state.lock();
        state.next_log_id += 1;
        let id = format!("log-{}", state.next_log_id);
        state.meal_logs.insert(id.clone(), log);
        id
    }

    pub fn weights(&self) -> Vec<WeightRecord> {
        self.state.lock().weights.clone()
    }

    pub fn meal_logs(&self) -> Vec<StoredMealLog> {
        let mut logs: Vec<_> = self
            .state
            .lock()
            .meal_logs
            .iter()
            .map(|(id, log)| StoredMealLog {
                id: id.clone(),
                log: log.clone(),
            })
            .collect();
        logs.sort_by(|a, b| a.id.cmp(&b.id));
        logs
    }

    pub fn meals(&self) -> Vec<MealDefinition> {
        self.state.lock().meals.values().cloned().collect()
    }

    pub fn plan_members(&self, plan_id: &MealPlanId) -> Vec<MealId> {
        self.state
            .lock()
            .plan_members
            .get(plan_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<RemoteOp> {
        self.state.lock().calls.clone()
    }

    /// Number of successful writes
    pub fn mutation_count(&self) -> usize {
        self.state.lock().mutations
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn find_weight_by_client_id(&self, id: &ActionId) -> RemoteResult<Option<WeightRecord>> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::FindWeight)?;
        Ok(state
            .weights
            .iter()
            .find(|w| &w.client_action_id == id)
            .cloned())
    }

    async fn insert_weight(&self, record: &WeightRecord) -> RemoteResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::InsertWeight)?;
        state.check_user(&record.user_id)?;
        if state
            .weights
            .iter()
            .any(|w| w.client_action_id == record.client_action_id)
        {
            return Err(RemoteError::UniqueViolation(format!(
                "weight client_action_id {}",
                record.client_action_id
            )));
        }
        state.weights.push(record.clone());
        state.mutated(RemoteOp::InsertWeight);
        Ok(())
    }

    async fn find_meal_log(
        &self,
        user_id: &UserId,
        item_id: &MealPlanItemId,
        date: NaiveDate,
    ) -> RemoteResult<Option<StoredMealLog>> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::FindMealLog)?;
        let mut matches: Vec<_> = state
            .meal_logs
            .iter()
            .filter(|(_, log)| {
                &log.user_id == user_id && &log.meal_plan_item_id == item_id && log.date == date
            })
            .map(|(id, log)| StoredMealLog {
                id: id.clone(),
                log: log.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.into_iter().next())
    }

    async fn insert_meal_log(&self, log: &MealLog) -> RemoteResult<String> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::InsertMealLog)?;
        state.check_user(&log.user_id)?;
        let taken = state.meal_logs.values().any(|existing| {
            existing.user_id == log.user_id
                && existing.meal_plan_item_id == log.meal_plan_item_id
                && existing.date == log.date
        });
        if taken {
            return Err(RemoteError::UniqueViolation(format!(
                "meal log for {} on {}",
                log.meal_plan_item_id, log.date
            )));
        }
        state.next_log_id += 1;
        let id = format!("log-{}", state.next_log_id);
        state.meal_logs.insert(id.clone(), log.clone());
        state.mutated(RemoteOp::InsertMealLog);
        Ok(id)
    }

    async fn update_meal_log(&self, id: &str, log: &MealLog) -> RemoteResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::UpdateMealLog)?;
        state.check_user(&log.user_id)?;
        match state.meal_logs.get_mut(id) {
            Some(existing) => *existing = log.clone(),
            None => return Err(RemoteError::NotFound(format!("meal log {}", id))),
        }
        state.mutated(RemoteOp::UpdateMealLog);
        Ok(())
    }

    async fn delete_meal_log(&self, id: &str) -> RemoteResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::DeleteMealLog)?;
        let owner = match state.meal_logs.get(id) {
            Some(log) => log.user_id.clone(),
            None => return Err(RemoteError::NotFound(format!("meal log {}", id))),
        };
        state.check_user(&owner)?;
        state.meal_logs.remove(id);
        state.mutated(RemoteOp::DeleteMealLog);
        Ok(())
    }

    async fn insert_meal(&self, meal: &MealDefinition) -> RemoteResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::InsertMeal)?;
        state.check_user(&meal.owner_id)?;
        if state.meals.contains_key(&meal.id) {
            return Err(RemoteError::UniqueViolation(format!("meal id {}", meal.id)));
        }
        state.meals.insert(meal.id.clone(), meal.clone());
        state.mutated(RemoteOp::InsertMeal);
        Ok(())
    }

    async fn plan_meal_ids(&self, plan_id: &MealPlanId) -> RemoteResult<Vec<MealId>> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::PlanMeals)?;
        Ok(state.plan_members.get(plan_id).cloned().unwrap_or_default())
    }

    async fn add_meal_to_plan(&self, plan_id: &MealPlanId, meal_id: &MealId) -> RemoteResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.begin(RemoteOp::AddMealToPlan)?;
        state
            .plan_members
            .entry(plan_id.clone())
            .or_default()
            .push(meal_id.clone());
        state.mutated(RemoteOp::AddMealToPlan);
        Ok(())
    }
}
