//! Handler registry
//!
//! Maps an [`ActionKind`] to the handler that applies it. The sync manager
//! looks handlers up here; an action whose kind has no registered handler is
//! treated as a terminal failure.

use super::add_custom_meal::AddCustomMealHandler;
use super::log_meal::LogMealHandler;
use super::log_weight::LogWeightHandler;
use super::traits::ActionHandler;
use crate::model::ActionKind;
use crate::remote::RemoteStore;
use chrono::FixedOffset;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers for every action kind
    pub fn with_defaults(remote: Arc<dyn RemoteStore>, day_offset: FixedOffset) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LogWeightHandler::new(remote.clone())));
        registry.register(Arc::new(LogMealHandler::new(remote.clone(), day_offset)));
        registry.register(Arc::new(AddCustomMealHandler::new(remote)));
        registry
    }

    /// Register a handler under its own kind, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.insert(handler.kind(), handler)
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
