//! The durable workflow engine (C1-C6): retry policies, the activity
//! invoker, append-only run history, worker leases, and the step-sequence
//! executor that composes them.

pub mod activity;
pub mod engine;
pub mod history;
pub mod lease;
pub mod retry;

pub use activity::{ActivityContext, CancellationToken, Collaborator, HeartbeatRecorder, IdempotencyKey, Outcome};
pub use engine::{Engine, RunContext, StepOutcome, WorkflowDefinition};
pub use history::{Attempt, AttemptOutcome, Event, HistoryStore, InMemoryHistoryStore, RunId, RunResult, RunState, SledHistoryStore, WorkflowRun};
pub use lease::LeaseTable;
pub use retry::RetryPolicy;
