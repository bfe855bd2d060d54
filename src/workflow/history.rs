//! Durable per-run event history (C6 durability contract).
//!
//! Grounded on the teacher's `state/store.rs` `StateStore`: cache-first reads
//! through a `DashMap`, sled for cold/durable storage, `serde_json` envelopes
//! under a prefixed key scheme. `HistoryStore` trades the teacher's
//! spec/case/receipt triad for a single `run:{id}` record per spec §6's
//! persisted state layout — `WorkflowRun.history` is the one thing here that
//! must never shrink or reorder.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// A deterministically derived workflow run identifier (spec §4.8): the same
/// `(name, payload_id, value_date)` always yields the same id, which is what
/// makes `Orchestrator::start` idempotent under duplicate submission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RunId {
    /// Namespace for the v5 UUID derivation; fixed so that the derivation is
    /// stable across process restarts and engine versions.
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x6a, 0x1e, 0xc4, 0x6f, 0x0a, 0x39, 0x4b, 0x9d, 0x8e, 0x21, 0x51, 0x3e, 0x2f, 0x0a, 0x77, 0x02,
    ]);

    pub fn deterministic(workflow_name: &str, payload_id: &str, value_date: DateTime<Utc>) -> Self {
        let key = format!("{workflow_name}:{payload_id}:{}", value_date.to_rfc3339());
        let uuid = Uuid::new_v5(&Self::NAMESPACE, key.as_bytes());
        Self(uuid.to_string())
    }
}

/// Terminal and non-terminal states a [`WorkflowRun`] can occupy (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    AwaitingManual,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled | RunState::AwaitingManual
        )
    }
}

/// The outcome of one [`Attempt`] at a step (spec §3 `ActivityAttempt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok,
    TransientError,
    PermanentError,
    Timeout,
    Cancelled,
}

/// A single attempt at executing a step, as recorded alongside a
/// `StepCompleted` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub step_id: String,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: AttemptOutcome,
    pub error_detail: Option<String>,
}

/// An append-only history entry (spec §6 persisted state layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StepStarted {
        step_id: String,
        attempt: u32,
        idempotency_key: String,
        started_at: DateTime<Utc>,
    },
    Heartbeat {
        step_id: String,
        attempt: u32,
        at: DateTime<Utc>,
        note: String,
    },
    StepCompleted {
        step_id: String,
        attempt: u32,
        outcome: AttemptOutcome,
        ended_at: DateTime<Utc>,
        error: Option<String>,
    },
    CancelRequested {
        at: DateTime<Utc>,
    },
    RunCompleted {
        state: RunState,
        result: RunResult,
        at: DateTime<Utc>,
    },
}

/// A durable, replayable execution of a named workflow (spec §3). `history` is
/// the source of truth; every other field is reconstructible by replaying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub name: String,
    pub state: RunState,
    pub history: Vec<Event>,
    pub current_step: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub attempts_for_current_step: u32,
    pub result: Option<RunResult>,
    pub created_at: DateTime<Utc>,
    /// The alias-resolver version this run started with, held fixed for the
    /// run's lifetime so replay stays deterministic under resolver updates
    /// (spec §5 "Shared resources").
    pub resolver_version: u64,
}

/// The terminal, user-visible result of a run (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunResult {
    Completed,
    ManualReview { reason: String },
    Failed { error: String },
    Cancelled,
}

impl WorkflowRun {
    pub fn new(id: RunId, name: impl Into<String>, resolver_version: u64) -> Self {
        Self {
            id,
            name: name.into(),
            state: RunState::Pending,
            history: Vec::new(),
            current_step: None,
            next_retry_at: None,
            attempts_for_current_step: 0,
            result: None,
            created_at: Utc::now(),
            resolver_version,
        }
    }

    /// Appends `event` to history and folds it into the run's derived fields.
    /// This is the only way derived state should ever change — it keeps
    /// `history` authoritative (spec §4.6 durability contract).
    pub fn apply(&mut self, event: Event) {
        match &event {
            Event::StepStarted { step_id, attempt, .. } => {
                self.state = RunState::Running;
                self.current_step = Some(step_id.clone());
                self.attempts_for_current_step = *attempt;
            }
            Event::Heartbeat { .. } => {}
            Event::StepCompleted { outcome, .. } => {
                if matches!(outcome, AttemptOutcome::TransientError | AttemptOutcome::Timeout) {
                    self.next_retry_at = None; // set by the engine once it computes the backoff delay
                }
            }
            Event::CancelRequested { .. } => {
                self.state = RunState::Cancelling;
            }
            Event::RunCompleted { state, result, .. } => {
                self.state = *state;
                self.result = Some(result.clone());
            }
        }
        self.history.push(event);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Durable storage for [`WorkflowRun`]s. Implementations must guarantee that a
/// successful `append_event` is visible to every subsequent `load` — there is
/// no eventual consistency within a single history store.
pub trait HistoryStore: Send + Sync {
    fn create_run(&self, run: WorkflowRun) -> WorkflowResult<()>;
    fn load_run(&self, id: &RunId) -> WorkflowResult<Option<WorkflowRun>>;
    fn append_event(&self, id: &RunId, event: Event) -> WorkflowResult<()>;
    /// Runs not yet terminal: pending, or running with a due retry.
    fn list_active(&self) -> WorkflowResult<Vec<RunId>>;
}

/// An in-memory [`HistoryStore`] for tests and the in-process test doubles in
/// `workflows::collaborators`.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    runs: DashMap<RunId, WorkflowRun>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn create_run(&self, run: WorkflowRun) -> WorkflowResult<()> {
        self.runs.entry(run.id.clone()).or_insert(run);
        Ok(())
    }

    fn load_run(&self, id: &RunId) -> WorkflowResult<Option<WorkflowRun>> {
        Ok(self.runs.get(id).map(|r| r.value().clone()))
    }

    fn append_event(&self, id: &RunId, event: Event) -> WorkflowResult<()> {
        let mut entry = self
            .runs
            .get_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(format!("run {id}")))?;
        entry.apply(event);
        Ok(())
    }

    fn list_active(&self) -> WorkflowResult<Vec<RunId>> {
        Ok(self
            .runs
            .iter()
            .filter(|entry| !entry.value().is_terminal())
            .map(|entry| entry.key().clone())
            .collect())
    }
}

/// A sled-backed [`HistoryStore`], grounded on the teacher's `StateStore`:
/// cache-first reads through a `DashMap`, sled holds the durable copy under a
/// `run:{id}` key.
pub struct SledHistoryStore {
    db: sled::Db,
    cache: DashMap<RunId, Arc<WorkflowRun>>,
}

impl SledHistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> WorkflowResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            cache: DashMap::new(),
        })
    }

    fn key(id: &RunId) -> String {
        format!("run:{id}")
    }

    fn persist(&self, run: &WorkflowRun) -> WorkflowResult<()> {
        let bytes = serde_json::to_vec(run)?;
        self.db.insert(Self::key(&run.id).as_bytes(), bytes)?;
        self.cache.insert(run.id.clone(), Arc::new(run.clone()));
        Ok(())
    }
}

impl HistoryStore for SledHistoryStore {
    fn create_run(&self, run: WorkflowRun) -> WorkflowResult<()> {
        if self.load_run(&run.id)?.is_some() {
            return Ok(());
        }
        self.persist(&run)
    }

    fn load_run(&self, id: &RunId) -> WorkflowResult<Option<WorkflowRun>> {
        if let Some(run) = self.cache.get(id) {
            return Ok(Some((**run).clone()));
        }
        match self.db.get(Self::key(id).as_bytes())? {
            Some(bytes) => {
                let run: WorkflowRun = serde_json::from_slice(&bytes)?;
                self.cache.insert(id.clone(), Arc::new(run.clone()));
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    fn append_event(&self, id: &RunId, event: Event) -> WorkflowResult<()> {
        let mut run = self
            .load_run(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("run {id}")))?;
        run.apply(event);
        self.persist(&run)
    }

    fn list_active(&self) -> WorkflowResult<Vec<RunId>> {
        let mut active = BTreeMap::new();
        for item in self.db.scan_prefix(b"run:") {
            let (_, bytes) = item?;
            let run: WorkflowRun = serde_json::from_slice(&bytes)?;
            if !run.is_terminal() {
                active.insert(run.id.clone(), ());
            }
        }
        Ok(active.into_keys().collect())
    }
}
