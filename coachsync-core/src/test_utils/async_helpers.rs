//! Async test helpers
//!
//! Timeouts and polling for tests that wait on background tasks (the
//! connectivity watcher, drains spawned from `on_connected`).

use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

/// Default timeout for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between condition checks in [`wait_for`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    Elapsed,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out")
    }
}

impl std::error::Error for TimeoutError {}

/// Run a future with a timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed)
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_for<F, Fut>(limit: Duration, mut condition: F) -> Result<(), TimeoutError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    with_timeout(limit, async {
        while !condition().await {
            sleep(POLL_INTERVAL).await;
        }
    })
    .await
}
