//! Network Monitor
//!
//! One interface over whatever connectivity signal the platform offers.

pub mod monitor;
pub mod probe;

pub use monitor::{NetworkMonitor, NetworkStatus, Subscription};
pub use probe::ReachabilityProbe;
