//! Sync Manager
//!
//! Drains the action queue against the remote store. At most one drain runs
//! at a time: `is_syncing` is claimed with a compare-exchange before the
//! first await and released by a guard, so a trigger arriving mid-pass is a
//! no-op rather than a second concurrent drain.
//!
//! Within a pass actions are applied strictly in queue order, one at a time.
//! A failing action never blocks the ones behind it.

use super::report::{ActionDiagnostics, DrainReport, SkipReason, SyncOutcome};
use super::settings::{SyncSettings, TerminalPolicy};
use crate::handlers::{ApplyOutcome, HandlerError, HandlerRegistry};
use crate::metrics;
use crate::model::{ActionId, OfflineAction};
use crate::network::{NetworkMonitor, Subscription};
use crate::queue::ActionQueueStore;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Releases the drain claim when dropped
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// How a single action left the pass
enum Disposition {
    Applied,
    AlreadyApplied,
    Deferred,
    Quarantined,
    Discarded,
    Retained,
}

pub struct SyncManager {
    store: Arc<dyn ActionQueueStore>,
    registry: HandlerRegistry,
    settings: SyncSettings,
    is_syncing: AtomicBool,
    is_online: AtomicBool,
    diagnostics: Mutex<HashMap<ActionId, ActionDiagnostics>>,
}

impl SyncManager {
    /// Create a manager that starts offline and idle
    pub fn new(
        store: Arc<dyn ActionQueueStore>,
        registry: HandlerRegistry,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
            is_syncing: AtomicBool::new(false),
            is_online: AtomicBool::new(false),
            diagnostics: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::Acquire)
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    /// Mirror the latest connectivity reading
    pub fn set_online(&self, online: bool) {
        let previous = self.is_online.swap(online, Ordering::AcqRel);
        if previous != online {
            debug!(online, "Sync manager connectivity updated");
        }
    }

    /// Failure history of actions that are still pending
    pub fn diagnostics(&self) -> HashMap<ActionId, ActionDiagnostics> {
        self.diagnostics.lock().clone()
    }

    /// Wire the manager to a network monitor
    ///
    /// Keeps `is_online` in step with every status change and starts a drain
    /// on each transition into online. Must be called from within a tokio
    /// runtime. The manager is held weakly, so the wiring does not keep it
    /// alive.
    pub fn attach(self: &Arc<Self>, monitor: &NetworkMonitor) -> Subscription {
        self.set_online(monitor.is_online());

        let mut status_rx = monitor.subscribe();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                match weak.upgrade() {
                    Some(manager) => manager.set_online(status.is_online()),
                    None => break,
                }
            }
            debug!("Connectivity watcher stopped");
        });

        let runtime = tokio::runtime::Handle::current();
        let weak = Arc::downgrade(self);
        monitor.on_connected(move || {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            // The watcher may not have observed the change yet
            manager.set_online(true);
            runtime.spawn(async move {
                manager.sync().await;
            });
        })
    }

    /// Run one drain pass if online and no pass is in flight
    ///
    /// Per-action failures are logged and tallied, never returned.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.is_online() {
            debug!("Sync skipped: offline");
            metrics::record_skipped();
            return SyncOutcome::skipped(SkipReason::Offline);
        }

        let Some(_guard) = SyncGuard::acquire(&self.is_syncing) else {
            debug!("Sync skipped: a pass is already running");
            metrics::record_skipped();
            return SyncOutcome::skipped(SkipReason::AlreadySyncing);
        };

        let started = Instant::now();
        let mut report = DrainReport::default();

        let actions = match self.store.get_pending_actions().await {
            Ok(actions) => actions,
            Err(e) => {
                error!(error = %e, "Failed to read pending actions; nothing drained");
                report.elapsed = started.elapsed();
                metrics::record_drain(&report);
                return SyncOutcome::Completed(report);
            }
        };

        self.forget_missing(&actions);
        report.attempted = actions.len();
        if !actions.is_empty() {
            info!(pending = actions.len(), "Sync pass started");
        }

        for action in &actions {
            match self.process(action).await {
                Disposition::Applied => report.applied += 1,
                Disposition::AlreadyApplied => report.already_applied += 1,
                Disposition::Deferred => report.deferred += 1,
                Disposition::Quarantined => report.quarantined += 1,
                Disposition::Discarded => report.discarded += 1,
                Disposition::Retained => report.retained += 1,
            }
        }

        report.elapsed = started.elapsed();
        metrics::record_drain(&report);
        if report.attempted > 0 {
            info!(
                applied = report.applied,
                already_applied = report.already_applied,
                deferred = report.deferred,
                quarantined = report.quarantined,
                discarded = report.discarded,
                retained = report.retained,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Sync pass finished"
            );
        }

        SyncOutcome::Completed(report)
    }

    async fn process(&self, action: &OfflineAction) -> Disposition {
        let kind = action.kind();
        let Some(handler) = self.registry.get(kind) else {
            let err = HandlerError::Validation(format!("no handler registered for {}", kind));
            return self.terminal(action, &err).await;
        };

        let result = match tokio::time::timeout(self.settings.handler_timeout, handler.apply(action)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::TransientNetwork(format!(
                "handler timed out after {:?}",
                self.settings.handler_timeout
            ))),
        };

        match result {
            Ok(ApplyOutcome::Applied) => {
                debug!(action_id = %action.id, %kind, "Action applied");
                self.remove(action, Disposition::Applied).await
            }
            Ok(ApplyOutcome::NoOp) => {
                debug!(action_id = %action.id, %kind, "Remote already up to date");
                self.remove(action, Disposition::AlreadyApplied).await
            }
            Err(e) if e.is_already_applied() => {
                debug!(action_id = %action.id, %kind, reason = %e, "Action was already applied");
                self.remove(action, Disposition::AlreadyApplied).await
            }
            Err(e) if e.is_terminal() => self.terminal(action, &e).await,
            Err(e) => {
                warn!(action_id = %action.id, %kind, error = %e, "Action deferred to next pass");
                self.record_failure(&action.id, &e.to_string());
                Disposition::Deferred
            }
        }
    }

    /// Drop a successfully applied action from the queue
    ///
    /// If removal fails the action is replayed next pass, which the handlers
    /// tolerate.
    async fn remove(&self, action: &OfflineAction, disposition: Disposition) -> Disposition {
        match self.store.remove_action(&action.id).await {
            Ok(()) => {
                self.forget(&action.id);
                disposition
            }
            Err(e) => {
                error!(action_id = %action.id, error = %e, "Applied action could not be removed");
                self.record_failure(&action.id, &format!("remove failed: {}", e));
                Disposition::Deferred
            }
        }
    }

    async fn terminal(&self, action: &OfflineAction, err: &HandlerError) -> Disposition {
        let kind = action.kind();
        match self.settings.terminal_policy {
            TerminalPolicy::Quarantine => {
                match self.store.quarantine_action(&action.id, &err.to_string()).await {
                    Ok(()) => {
                        warn!(action_id = %action.id, %kind, error = %err, "Action quarantined");
                        self.forget(&action.id);
                        Disposition::Quarantined
                    }
                    Err(e) => {
                        error!(action_id = %action.id, error = %e, "Failed to quarantine action");
                        self.record_failure(&action.id, &err.to_string());
                        Disposition::Retained
                    }
                }
            }
            TerminalPolicy::Discard => match self.store.remove_action(&action.id).await {
                Ok(()) => {
                    warn!(action_id = %action.id, %kind, error = %err, "Action discarded");
                    self.forget(&action.id);
                    Disposition::Discarded
                }
                Err(e) => {
                    error!(action_id = %action.id, error = %e, "Failed to discard action");
                    self.record_failure(&action.id, &err.to_string());
                    Disposition::Retained
                }
            },
            TerminalPolicy::Retain => {
                warn!(action_id = %action.id, %kind, error = %err, "Action failed terminally; kept queued");
                self.record_failure(&action.id, &err.to_string());
                Disposition::Retained
            }
        }
    }

    fn record_failure(&self, id: &ActionId, error: &str) {
        let mut diagnostics = self.diagnostics.lock();
        let entry = diagnostics.entry(id.clone()).or_insert_with(|| ActionDiagnostics {
            failures: 0,
            last_error: String::new(),
            last_attempt: Utc::now(),
        });
        entry.failures += 1;
        entry.last_error = error.to_string();
        entry.last_attempt = Utc::now();
    }

    fn forget(&self, id: &ActionId) {
        self.diagnostics.lock().remove(id);
    }

    /// Drop diagnostics for actions that left the queue some other way
    fn forget_missing(&self, pending: &[OfflineAction]) {
        let ids: HashSet<&ActionId> = pending.iter().map(|a| &a.id).collect();
        self.diagnostics.lock().retain(|id, _| ids.contains(id));
    }
}
