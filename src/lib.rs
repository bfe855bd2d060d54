//! Durable cash-application workflow engine: payment extraction, ERP lookup,
//! invoice matching, posting, and notification with at-least-once retries.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod matcher;
pub mod observability;
pub mod orchestrator;
pub mod workflow;
pub mod workflows;

pub use config::AppConfig;
pub use error::{WorkflowError, WorkflowResult};
pub use orchestrator::Orchestrator;
