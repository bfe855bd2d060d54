//! Metrics collector (spec §4.8, §6): actually wired to the `metrics` crate,
//! unlike the teacher's stubbed `observability::metrics::MetricsCollector`
//! (every `record_*` method there is a `TODO`). Injected into the
//! orchestrator façade at construction; never accessed as a global.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Counters/histograms/gauges required by spec §4.8 and §6.
pub struct MetricsCollector {
    prefix: &'static str,
}

impl MetricsCollector {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    pub fn run_started(&self, workflow_name: &str, client_id: &str) {
        counter!(format!("{}runs_started", self.prefix), "name" => workflow_name.to_string(), "client" => client_id.to_string()).increment(1);
    }

    pub fn run_duration(&self, workflow_name: &str, duration: Duration) {
        histogram!(format!("{}run_duration", self.prefix), "name" => workflow_name.to_string()).record(duration.as_secs_f64());
    }

    pub fn active_runs(&self, workflow_name: &str, count: i64) {
        gauge!(format!("{}active_runs", self.prefix), "name" => workflow_name.to_string()).set(count as f64);
    }

    pub fn activity_attempt(&self, step_id: &str, outcome: &str) {
        counter!(format!("{}activity_attempts", self.prefix), "step" => step_id.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    pub fn retry_scheduled(&self, step_id: &str) {
        counter!(format!("{}retry_scheduled", self.prefix), "step" => step_id.to_string()).increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new("cashapp_engine_")
    }
}

/// Shared handle passed into the orchestrator and, transitively, the engine.
pub type SharedMetrics = Arc<MetricsCollector>;
