//! Per-run worker leases (spec §5 "Scheduling"): a run is owned by exactly one
//! worker at a time, for at most `ttl`; on expiry it becomes eligible again.
//!
//! Grounded on the teacher's `services/timer.rs` `TimerService`: an in-memory
//! table keyed by id, with expiry checked by wall-clock comparison rather than
//! a background poll loop, since the worker pool already visits each active
//! run on its own cadence (C6's worker loop, not modeled here as a separate
//! timer thread).

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::workflow::history::RunId;

#[derive(Debug, Clone)]
struct LeaseEntry {
    owner: String,
    expires_at: DateTime<Utc>,
}

/// Tracks which worker currently owns which run, and for how long.
#[derive(Default)]
pub struct LeaseTable {
    leases: DashMap<RunId, LeaseEntry>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire the lease for `run_id` on behalf of `owner`.
    /// Succeeds if the run is unleased or its existing lease has expired.
    pub fn try_acquire(&self, run_id: &RunId, owner: &str, ttl: Duration) -> bool {
        let now = Utc::now();
        let acquired = match self.leases.get(run_id) {
            Some(existing) if existing.expires_at > now && existing.owner != owner => false,
            _ => true,
        };
        if acquired {
            self.leases.insert(
                run_id.clone(),
                LeaseEntry {
                    owner: owner.to_string(),
                    expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30)),
                },
            );
        }
        acquired
    }

    /// Extends an already-held lease; a no-op (returns `false`) if `owner`
    /// does not currently hold it.
    pub fn renew(&self, run_id: &RunId, owner: &str, ttl: Duration) -> bool {
        match self.leases.get_mut(run_id) {
            Some(mut entry) if entry.owner == owner => {
                entry.expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30));
                true
            }
            _ => false,
        }
    }

    /// Releases the lease early (normal completion or cooperative handoff).
    pub fn release(&self, run_id: &RunId, owner: &str) {
        if let Some(entry) = self.leases.get(run_id) {
            if entry.owner == owner {
                drop(entry);
                self.leases.remove(run_id);
            }
        }
    }

    pub fn is_leased(&self, run_id: &RunId) -> bool {
        match self.leases.get(run_id) {
            Some(entry) => entry.expires_at > Utc::now(),
            None => false,
        }
    }
}
