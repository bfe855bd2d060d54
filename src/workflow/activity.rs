//! Activity invoker (C2): calls a collaborator with a timeout, heartbeat
//! tracking, and cooperative cancellation.
//!
//! Grounded on the teacher's `resilience/timeout.rs` (the `tokio::time::timeout`
//! wrapper) and `services/timer.rs` (the heartbeat high-water-mark idea, kept
//! in memory rather than persisted per-beat per spec §4.6); the collaborator
//! trait shape follows `connectors/core.rs`'s `Connector`, generalized with
//! `async_trait` instead of hand-rolled boxed futures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::WorkflowError;
use crate::workflow::history::{Attempt, AttemptOutcome};

/// Deterministic tag a collaborator can use to deduplicate effects across
/// retried attempts (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub run_id: String,
    pub step_id: String,
    pub attempt: u32,
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.run_id, self.step_id, self.attempt)
    }
}

/// Cooperative cancellation: `cancel()` flips a flag observed by the invoker
/// at the next suspension point; it is never forced onto a collaborator that
/// ignores it (spec §5 "Cancellation").
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks the latest heartbeat a collaborator has emitted for an in-flight
/// attempt. Only the high-water-mark is kept, matching the teacher's timer
/// service design note that persisting every heartbeat is unnecessary.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatRecorder(Arc<Mutex<Option<(DateTime<Utc>, String)>>>);

impl HeartbeatRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self, note: impl Into<String>) {
        *self.0.lock() = Some((Utc::now(), note.into()));
    }

    pub fn latest(&self) -> Option<(DateTime<Utc>, String)> {
        self.0.lock().clone()
    }
}

/// Everything an activity implementation needs besides its typed input.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub idempotency_key: IdempotencyKey,
    pub heartbeat: HeartbeatRecorder,
    pub cancellation: CancellationToken,
}

/// A typed call out to an external collaborator (OCR, ERP, Notify, ManualReview).
///
/// Implementations classify their own failures into transient/permanent so the
/// invoker never has to understand a collaborator-specific error type (spec
/// §7 "Propagation").
#[async_trait]
pub trait Collaborator: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn call(&self, input: Self::Input, ctx: &ActivityContext) -> Result<Self::Output, WorkflowError>;
}

/// The classified result of one activity attempt (spec §9: exception-driven
/// control flow becomes explicit outcome variants).
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Transient(WorkflowError),
    Permanent(WorkflowError),
    Cancelled,
    Timeout,
}

impl<T> Outcome<T> {
    pub fn attempt_outcome(&self) -> AttemptOutcome {
        match self {
            Outcome::Ok(_) => AttemptOutcome::Ok,
            Outcome::Transient(_) => AttemptOutcome::TransientError,
            Outcome::Permanent(_) => AttemptOutcome::PermanentError,
            Outcome::Cancelled => AttemptOutcome::Cancelled,
            Outcome::Timeout => AttemptOutcome::Timeout,
        }
    }
}

/// A heartbeat must arrive within this fraction of `start_to_close`, or the
/// attempt is marked stale — grounded on the teacher's `services/timer.rs`
/// liveness loop, which watches a high-water-mark timestamp rather than
/// counting individual beats.
const HEARTBEAT_TIMEOUT_FRACTION: f64 = 1.0 / 3.0;

/// Invokes `collaborator` with `input`, enforcing `start_to_close` as an
/// absolute wall-clock cap on the attempt, a heartbeat-staleness deadline
/// that resets on every `ctx.heartbeat.beat()` call, and cooperative
/// cancellation via `ctx.cancellation` (spec §4.2).
pub async fn invoke<C: Collaborator>(
    collaborator: &C,
    input: C::Input,
    ctx: ActivityContext,
    start_to_close: Duration,
) -> (Outcome<C::Output>, Attempt) {
    let started_at = Utc::now();

    if ctx.cancellation.is_cancelled() {
        let attempt = Attempt {
            step_id: ctx.idempotency_key.step_id.clone(),
            attempt_number: ctx.idempotency_key.attempt,
            started_at,
            ended_at: Some(Utc::now()),
            outcome: AttemptOutcome::Cancelled,
            error_detail: None,
        };
        return (Outcome::Cancelled, attempt);
    }

    let heartbeat_timeout = start_to_close.mul_f64(HEARTBEAT_TIMEOUT_FRACTION);
    let heartbeat = ctx.heartbeat.clone();

    let stale_watch = async {
        loop {
            let last_seen = heartbeat.latest().map(|(at, _)| at).unwrap_or(started_at);
            let elapsed = Utc::now().signed_duration_since(last_seen).to_std().unwrap_or(Duration::ZERO);
            if elapsed >= heartbeat_timeout {
                return;
            }
            tokio::time::sleep(heartbeat_timeout - elapsed).await;
        }
    };

    let call = collaborator.call(input, &ctx);

    enum Raced<T> {
        Called(Result<T, WorkflowError>),
        StartToCloseElapsed,
        HeartbeatStale,
    }

    let raced = tokio::select! {
        result = tokio::time::timeout(start_to_close, call) => match result {
            Ok(inner) => Raced::Called(inner),
            Err(_elapsed) => Raced::StartToCloseElapsed,
        },
        _ = stale_watch => Raced::HeartbeatStale,
    };

    let (outcome, error_detail) = match raced {
        Raced::StartToCloseElapsed => (Outcome::Timeout, Some("start-to-close timeout exceeded".to_string())),
        Raced::HeartbeatStale => (Outcome::Timeout, Some("heartbeat timeout exceeded".to_string())),
        Raced::Called(Err(err)) if ctx.cancellation.is_cancelled() => (Outcome::Cancelled, Some(err.to_string())),
        Raced::Called(Err(err @ WorkflowError::TransientCollaborator(_))) | Raced::Called(Err(err @ WorkflowError::EngineInternal(_))) => {
            let detail = err.to_string();
            (Outcome::Transient(err), Some(detail))
        }
        Raced::Called(Err(err)) => {
            let detail = err.to_string();
            (Outcome::Permanent(err), Some(detail))
        }
        Raced::Called(Ok(value)) => (Outcome::Ok(value), None),
    };

    let attempt = Attempt {
        step_id: ctx.idempotency_key.step_id.clone(),
        attempt_number: ctx.idempotency_key.attempt,
        started_at,
        ended_at: Some(Utc::now()),
        outcome: outcome.attempt_outcome(),
        error_detail,
    };

    (outcome, attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Collaborator for Echo {
        type Input = u32;
        type Output = u32;

        async fn call(&self, input: u32, ctx: &ActivityContext) -> Result<u32, WorkflowError> {
            ctx.heartbeat.beat("working");
            Ok(input * 2)
        }
    }

    struct SilentForever;

    #[async_trait]
    impl Collaborator for SilentForever {
        type Input = ();
        type Output = ();

        async fn call(&self, _input: (), _ctx: &ActivityContext) -> Result<(), WorkflowError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    struct AlwaysTransient;

    #[async_trait]
    impl Collaborator for AlwaysTransient {
        type Input = ();
        type Output = ();

        async fn call(&self, _input: (), _ctx: &ActivityContext) -> Result<(), WorkflowError> {
            Err(WorkflowError::TransientCollaborator("erp unavailable".to_string()))
        }
    }

    fn ctx() -> ActivityContext {
        ActivityContext {
            idempotency_key: IdempotencyKey {
                run_id: "r1".to_string(),
                step_id: "s1".to_string(),
                attempt: 1,
            },
            heartbeat: HeartbeatRecorder::new(),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn successful_call_records_heartbeat_and_ok_outcome() {
        let context = ctx();
        let heartbeat = context.heartbeat.clone();
        let (outcome, attempt) = invoke(&Echo, 21, context, Duration::from_secs(1)).await;
        assert!(matches!(outcome, Outcome::Ok(42)));
        assert_eq!(attempt.outcome, AttemptOutcome::Ok);
        assert!(heartbeat.latest().is_some());
    }

    #[tokio::test]
    async fn transient_collaborator_error_is_classified_transient() {
        let (outcome, attempt) = invoke(&AlwaysTransient, (), ctx(), Duration::from_secs(1)).await;
        assert!(matches!(outcome, Outcome::Transient(_)));
        assert_eq!(attempt.outcome, AttemptOutcome::TransientError);
    }

    #[tokio::test]
    async fn collaborator_that_never_heartbeats_times_out_before_start_to_close() {
        let (outcome, attempt) = invoke(&SilentForever, (), ctx(), Duration::from_secs(2)).await;
        assert!(matches!(outcome, Outcome::Timeout));
        assert_eq!(attempt.outcome, AttemptOutcome::Timeout);
        assert!(attempt.error_detail.unwrap().contains("heartbeat"));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_the_call() {
        let context = ctx();
        context.cancellation.cancel();
        let (outcome, attempt) = invoke(&Echo, 1, context, Duration::from_secs(1)).await;
        assert!(matches!(outcome, Outcome::Cancelled));
        assert_eq!(attempt.outcome, AttemptOutcome::Cancelled);
    }
}
