//! Structured logging setup (spec A.2): `tracing` + `tracing-subscriber`,
//! env-filter driven, matching the teacher's observability wiring.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{WorkflowError, WorkflowResult};

/// Installs the global tracing subscriber. Call once, at process start.
pub fn init(config: &LoggingConfig) -> WorkflowResult<()> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| WorkflowError::InvalidInput(format!("invalid logging level: {e}")))?;

    fmt().with_env_filter(filter).with_target(true).try_init().map_err(|e| WorkflowError::EngineInternal(e.to_string()))
}
