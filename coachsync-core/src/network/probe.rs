//! TCP reachability probe
//!
//! A portable connectivity signal for hosts without an OS reachability API:
//! periodically opens a TCP connection to a known endpoint and reports the
//! outcome to a [`NetworkMonitor`].

use super::monitor::{NetworkMonitor, NetworkStatus};
use crate::config::NetworkConfig;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Periodic TCP connect check
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    address: String,
    interval: Duration,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(address: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            interval,
            timeout,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.probe_address.clone(),
            config.probe_interval,
            config.probe_timeout,
        )
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Attempt one connection
    pub async fn check_once(&self) -> NetworkStatus {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => NetworkStatus::Online,
            Ok(Err(e)) => {
                debug!(address = %self.address, error = %e, "Probe connect failed");
                NetworkStatus::Offline
            }
            Err(_) => {
                debug!(address = %self.address, "Probe timed out");
                NetworkStatus::Offline
            }
        }
    }

    /// Probe on every interval tick until a shutdown signal arrives
    pub async fn run(
        self,
        monitor: Arc<NetworkMonitor>,
        mut shutdown: broadcast::Receiver<ShutdownSignal>,
    ) {
        info!(address = %self.address, interval = ?self.interval, "Reachability probe started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = self.check_once().await;
                    monitor.report(status);
                }
                _ = shutdown.recv() => {
                    info!("Reachability probe stopped");
                    break;
                }
            }
        }
    }
}
