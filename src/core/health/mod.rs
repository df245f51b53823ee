//! Provider health
//!
//! Health here means "could this provider serve a request at all", which
//! for a prepaid-billing gateway reduces to credential presence: a health
//! probe must never make a billable generation call. Checks touch only
//! adapter configuration state and are lock-free with respect to the
//! credit ledger.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::providers::ProviderRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Healthy,
    NotConfigured,
}

/// One non-billable pass over the registry
pub fn probe(registry: &ProviderRegistry) -> HashMap<String, ProviderStatus> {
    registry
        .iter()
        .map(|(name, provider)| {
            let status = if provider.is_configured() {
                ProviderStatus::Healthy
            } else {
                ProviderStatus::NotConfigured
            };
            (name.to_string(), status)
        })
        .collect()
}

/// Periodic health sampling with an on-demand escape hatch.
///
/// The background task refreshes a snapshot on a fixed interval;
/// [`latest`](HealthMonitor::latest) reads it without touching the
/// registry. [`check`](HealthMonitor::check) probes immediately and
/// refreshes the snapshot as a side effect.
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    check_interval: Duration,
    snapshot: Arc<RwLock<HashMap<String, ProviderStatus>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ProviderRegistry>, check_interval: Duration) -> Self {
        Self {
            registry,
            check_interval,
            snapshot: Arc::new(RwLock::new(HashMap::new())),
            task: Mutex::new(None),
        }
    }

    /// On-demand check
    pub fn check(&self) -> HashMap<String, ProviderStatus> {
        let statuses = probe(&self.registry);
        *self.snapshot.write() = statuses.clone();
        statuses
    }

    /// Last sampled statuses without probing
    pub fn latest(&self) -> HashMap<String, ProviderStatus> {
        self.snapshot.read().clone()
    }

    /// Start interval sampling. Idempotent; a second call replaces the
    /// previous task.
    pub fn start(&self) {
        let registry = self.registry.clone();
        let snapshot = self.snapshot.clone();
        let check_interval = self.check_interval;

        info!(interval_secs = check_interval.as_secs(), "health monitoring started");
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            loop {
                interval.tick().await;
                let statuses = probe(&registry);
                debug!(providers = statuses.len(), "health snapshot refreshed");
                *snapshot.write() = statuses;
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("health monitoring stopped");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderCredentials;

    fn registry() -> Arc<ProviderRegistry> {
        let credentials = ProviderCredentials {
            openai_api_key: Some("sk-test".to_string()),
            ..ProviderCredentials::default()
        };
        Arc::new(ProviderRegistry::from_credentials(&credentials))
    }

    #[test]
    fn probe_reports_configuration_presence() {
        let statuses = probe(&registry());
        assert_eq!(statuses["openai"], ProviderStatus::Healthy);
        assert_eq!(statuses["anthropic"], ProviderStatus::NotConfigured);
        assert_eq!(statuses["elevenlabs"], ProviderStatus::NotConfigured);
        assert_eq!(statuses.len(), 5);
    }

    #[tokio::test]
    async fn on_demand_check_refreshes_snapshot() {
        let monitor = HealthMonitor::new(registry(), Duration::from_secs(30));
        assert!(monitor.latest().is_empty());

        let statuses = monitor.check();
        assert_eq!(statuses.len(), 5);
        assert_eq!(monitor.latest(), statuses);
    }

    #[tokio::test]
    async fn interval_sampling_populates_snapshot() {
        let monitor = HealthMonitor::new(registry(), Duration::from_millis(10));
        monitor.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.latest().len(), 5);
        monitor.shutdown();
    }
}
