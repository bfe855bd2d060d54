//! Logging, metrics, and health reporting (spec A.2, B.3).

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{check as check_health, HealthReport, HealthStatus};
pub use metrics::{MetricsCollector, SharedMetrics};
