//! Orchestrator façade (C8): `start`/`status`/`cancel`/`stats`/`health`, with
//! admission control, deterministic run-id derivation, and worker-pool
//! bootstrap.
//!
//! Grounded on `original_source/services/orchestrator/temporal_worker.py` for
//! the "construct with an explicit worker pool size and a registered set of
//! workflow definitions" shape (spec B.2), and on the teacher's
//! `api/rest/server.rs::RestApiServer` for wrapping a single engine `Arc` in a
//! façade consumed by both the CLI and the HTTP layer.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::observability::{check_health, HealthReport, SharedMetrics};
use crate::workflow::activity::CancellationToken;
use crate::workflow::engine::{Engine, WorkflowDefinition};
use crate::workflow::history::{Event, HistoryStore, RunId, RunResult, RunState};
use crate::workflow::lease::LeaseTable;

type AdmissionLimiter = DefaultDirectRateLimiter;

/// Control-surface status codes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Accepted,
    RejectedInvalidPayload,
    RejectedOverloaded,
    NotFound,
    Conflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOutcome {
    pub run_id: Option<RunId>,
    pub status: ControlStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOutcome {
    pub status: ControlStatus,
    pub state: Option<RunState>,
    pub current_step: Option<String>,
    pub result: Option<RunResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub status: ControlStatus,
    pub state: Option<RunState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub active_runs_by_name: BTreeMap<String, usize>,
    pub started_total: u64,
}

/// Ties the durable engine to admission control, leases, and metrics. One
/// `Orchestrator` is constructed per process and shared behind an `Arc` with
/// the CLI, the HTTP layer, and the worker pool.
pub struct Orchestrator {
    config: AppConfig,
    engine: Arc<Engine>,
    history: Arc<dyn HistoryStore>,
    leases: Arc<LeaseTable>,
    metrics: SharedMetrics,
    admission: AdmissionLimiter,
    started_total: AtomicU64,
    resolver_version: u64,
    /// Payloads are cached in-memory so the worker pool can re-drive a run it
    /// did not itself submit. The durable header only records a payload hash
    /// (spec §6 persisted state layout), not the payload itself — across a
    /// full process restart a run with no lease holder still present must be
    /// resubmitted by its caller to resume; this is a known limitation noted
    /// in the design ledger rather than a full payload store.
    payloads: DashMap<RunId, Value>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        definitions: Vec<Arc<dyn WorkflowDefinition>>,
        history: Arc<dyn HistoryStore>,
        metrics: SharedMetrics,
    ) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.orchestrator.max_active_runs.clamp(1, u32::MAX as usize) as u32).unwrap());
        Self {
            engine: Arc::new(Engine::new(history.clone(), definitions)),
            history,
            leases: Arc::new(LeaseTable::new()),
            metrics,
            admission: RateLimiter::direct(quota),
            started_total: AtomicU64::new(0),
            resolver_version: 1,
            payloads: DashMap::new(),
            config,
        }
    }

    /// Submits `payload` to the named workflow. Idempotent by `(name,
    /// payload.id, payload.value_date)` (spec §4.8): a duplicate submission
    /// returns the existing run rather than starting a new one.
    pub fn start(&self, name: &str, payload: Value, client_id: &str) -> StartOutcome {
        if self.admission.check().is_err() {
            warn!(workflow = name, "admission rejected: overloaded");
            return StartOutcome { run_id: None, status: ControlStatus::RejectedOverloaded };
        }

        let active_count = self.history.list_active().map(|runs| runs.len()).unwrap_or(usize::MAX);
        if active_count >= self.config.orchestrator.max_active_runs {
            return StartOutcome { run_id: None, status: ControlStatus::RejectedOverloaded };
        }

        match self.engine.start(name, payload.clone(), self.resolver_version) {
            Ok(run_id) => {
                self.payloads.insert(run_id.clone(), payload);
                self.started_total.fetch_add(1, Ordering::Relaxed);
                self.metrics.run_started(name, client_id);
                info!(run_id = %run_id, workflow = name, "run accepted");
                StartOutcome { run_id: Some(run_id), status: ControlStatus::Accepted }
            }
            Err(err) => {
                warn!(workflow = name, error = %err, "rejected invalid payload");
                StartOutcome { run_id: None, status: ControlStatus::RejectedInvalidPayload }
            }
        }
    }

    pub fn status(&self, run_id: &RunId) -> StatusOutcome {
        match self.history.load_run(run_id) {
            Ok(Some(run)) => StatusOutcome {
                status: ControlStatus::Accepted,
                state: Some(run.state),
                current_step: run.current_step,
                result: run.result,
            },
            Ok(None) => StatusOutcome { status: ControlStatus::NotFound, state: None, current_step: None, result: None },
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "status lookup failed");
                StatusOutcome { status: ControlStatus::NotFound, state: None, current_step: None, result: None }
            }
        }
    }

    /// Requests cancellation: cooperative, observed at the run's next
    /// suspension point (spec §5). Terminal runs cannot be cancelled.
    pub fn cancel(&self, run_id: &RunId) -> CancelOutcome {
        let run = match self.history.load_run(run_id) {
            Ok(Some(run)) => run,
            Ok(None) => return CancelOutcome { status: ControlStatus::NotFound, state: None },
            Err(_) => return CancelOutcome { status: ControlStatus::NotFound, state: None },
        };

        if run.is_terminal() {
            return CancelOutcome { status: ControlStatus::Conflict, state: Some(run.state) };
        }

        match self.history.append_event(run_id, Event::CancelRequested { at: chrono::Utc::now() }) {
            Ok(()) => CancelOutcome { status: ControlStatus::Accepted, state: Some(RunState::Cancelling) },
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "cancel request failed to persist");
                CancelOutcome { status: ControlStatus::Conflict, state: Some(run.state) }
            }
        }
    }

    pub fn stats(&self) -> Stats {
        let mut active_runs_by_name = BTreeMap::new();
        if let Ok(active) = self.history.list_active() {
            for run_id in active {
                if let Ok(Some(run)) = self.history.load_run(&run_id) {
                    *active_runs_by_name.entry(run.name).or_insert(0) += 1;
                }
            }
        }
        Stats { active_runs_by_name, started_total: self.started_total.load(Ordering::Relaxed) }
    }

    pub fn health(&self) -> HealthReport {
        check_health(self.history.as_ref(), self.config.orchestrator.worker_pool_size)
    }

    /// Drives `run_id` once under a freshly-acquired lease, releasing it
    /// afterward regardless of outcome. Used both by direct callers (tests,
    /// the CLI's synchronous mode) and by the background worker pool.
    pub async fn drive_once(&self, run_id: &RunId, owner: &str) -> Option<RunResult> {
        let ttl = Duration::from_secs(self.config.orchestrator.lease_ttl_secs);
        if !self.leases.try_acquire(run_id, owner, ttl) {
            return None;
        }

        let payload = self.payloads.get(run_id).map(|entry| entry.clone())?;
        let started = Instant::now();

        let token = CancellationToken::new();
        if let Ok(Some(run)) = self.history.load_run(run_id) {
            if run.state == RunState::Cancelling {
                token.cancel();
            }
        }

        let result = self.engine.drive(run_id, payload, token).await;
        self.leases.release(run_id, owner);

        match result {
            Ok(outcome) => {
                if let Ok(Some(run)) = self.history.load_run(run_id) {
                    self.metrics.run_duration(&run.name, started.elapsed());
                }
                Some(outcome)
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "run drive failed");
                None
            }
        }
    }

    /// Spawns `worker_pool_size` background workers, each polling the history
    /// store for active runs and driving any it can lease (spec §5
    /// "Scheduling"). Returns the join handles so the caller can await a
    /// graceful shutdown.
    pub fn spawn_worker_pool(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.orchestrator.worker_pool_size)
            .map(|worker_index| {
                let orchestrator = self.clone();
                let owner = format!("worker-{worker_index}");
                tokio::spawn(async move {
                    loop {
                        let active = orchestrator.history.list_active().unwrap_or_default();
                        for run_id in active {
                            orchestrator.drive_once(&run_id, &owner).await;
                        }
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                })
            })
            .collect()
    }
}
