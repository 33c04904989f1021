//! Metrics for the sync engine
//!
//! Emitted through the `metrics` facade; installing a recorder (and an
//! exporter) is up to the embedding application.

use crate::sync::DrainReport;
use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const SYNC_PASSES: &str = "sync.passes";
pub const SYNC_SKIPPED: &str = "sync.skipped";
pub const ACTIONS_APPLIED: &str = "sync.actions.applied";
pub const ACTIONS_DEFERRED: &str = "sync.actions.deferred";
pub const ACTIONS_QUARANTINED: &str = "sync.actions.quarantined";
pub const ACTIONS_DISCARDED: &str = "sync.actions.discarded";
pub const PASS_DURATION_MS: &str = "sync.pass.duration_ms";
pub const ACTIONS_ENQUEUED: &str = "queue.actions.enqueued";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(SYNC_PASSES, "Number of drain passes that ran");
    describe_counter!(SYNC_SKIPPED, "Sync triggers ignored (offline or already syncing)");
    describe_counter!(ACTIONS_APPLIED, "Actions applied remotely and removed from the queue");
    describe_counter!(ACTIONS_DEFERRED, "Actions left queued after a transient failure");
    describe_counter!(ACTIONS_QUARANTINED, "Actions moved to quarantine after a terminal failure");
    describe_counter!(ACTIONS_DISCARDED, "Actions dropped after a terminal failure");
    describe_histogram!(PASS_DURATION_MS, "Drain pass duration in milliseconds");
    describe_counter!(ACTIONS_ENQUEUED, "Actions recorded into the offline queue");
}

/// Record the counters of a finished drain pass
pub fn record_drain(report: &DrainReport) {
    counter!(SYNC_PASSES).increment(1);
    counter!(ACTIONS_APPLIED).increment((report.applied + report.already_applied) as u64);
    counter!(ACTIONS_DEFERRED).increment(report.deferred as u64);
    counter!(ACTIONS_QUARANTINED).increment(report.quarantined as u64);
    counter!(ACTIONS_DISCARDED).increment(report.discarded as u64);
    histogram!(PASS_DURATION_MS).record(report.elapsed.as_secs_f64() * 1000.0);
}

pub fn record_skipped() {
    counter!(SYNC_SKIPPED).increment(1);
}

pub fn record_enqueued() {
    counter!(ACTIONS_ENQUEUED).increment(1);
}
