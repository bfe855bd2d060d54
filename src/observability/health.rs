//! Health checks (spec B.3, grounded in `original_source/shared/health_checks.py`):
//! a small status report on store connectivity and active worker capacity,
//! exposed by the orchestrator façade alongside its control surface.

use serde::{Deserialize, Serialize};

use crate::workflow::history::HistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub history_store_reachable: bool,
    pub active_run_count: usize,
    pub worker_pool_size: usize,
}

/// Probes the history store and reports on capacity. A reachable store with
/// no active-run count failure is `Healthy`; an unreachable store is
/// `Unhealthy`; anything else in between (not modeled yet) would be
/// `Degraded`.
pub fn check(store: &dyn HistoryStore, worker_pool_size: usize) -> HealthReport {
    match store.list_active() {
        Ok(active) => HealthReport {
            status: HealthStatus::Healthy,
            history_store_reachable: true,
            active_run_count: active.len(),
            worker_pool_size,
        },
        Err(_) => HealthReport {
            status: HealthStatus::Unhealthy,
            history_store_reachable: false,
            active_run_count: 0,
            worker_pool_size,
        },
    }
}
