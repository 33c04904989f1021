//! Sync Manager
//!
//! Owns the transient sync state (`is_syncing`, `is_online`) and drains the
//! action queue through the handler registry whenever connectivity returns or
//! the application asks for it.

pub mod manager;
pub mod report;
pub mod settings;

pub use manager::SyncManager;
pub use report::{ActionDiagnostics, DrainReport, SkipReason, SyncOutcome};
pub use settings::{SyncSettings, TerminalPolicy};
