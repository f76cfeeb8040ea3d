//! Spot-check throttling and blacklisting
//!
//! Ground-truth lookups are expensive, so at most one check runs per
//! `min_check_interval` across all workers. Workers with queries since their
//! last check are preferred; the rest are sampled at `sample_rate`. A worker
//! that fails a check stays blacklisted for the lifetime of the process.

use crate::config::ThrottleConfig;
use chrono::{DateTime, Utc};
use compass_core::WorkerId;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Per-worker throttle state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkerThrottle {
    /// Queries answered since the last completed check
    pub query_count: u64,
    pub blacklisted_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of the ledger
#[derive(Clone, Debug, Default, Serialize)]
pub struct ThrottleSnapshot {
    pub last_check_at: Option<DateTime<Utc>>,
    pub workers: BTreeMap<WorkerId, WorkerThrottle>,
}

impl ThrottleSnapshot {
    pub fn blacklisted(&self) -> Vec<WorkerId> {
        self.workers
            .iter()
            .filter(|(_, w)| w.blacklisted_at.is_some())
            .map(|(uid, _)| *uid)
            .collect()
    }
}

#[derive(Default)]
struct LedgerState {
    workers: BTreeMap<WorkerId, WorkerThrottle>,
    last_check_at: Option<DateTime<Utc>>,
}

/// Shared throttle ledger
pub struct ThrottleLedger {
    config: ThrottleConfig,
    state: Mutex<LedgerState>,
}

impl ThrottleLedger {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Count one more query for `uid` and return the new total
    pub fn record_query(&self, uid: WorkerId) -> u64 {
        let mut state = self.state.lock();
        let entry = state.workers.entry(uid).or_default();
        entry.query_count += 1;
        entry.query_count
    }

    pub fn query_count(&self, uid: WorkerId) -> u64 {
        self.state
            .lock()
            .workers
            .get(&uid)
            .map(|w| w.query_count)
            .unwrap_or(0)
    }

    /// Decide whether `uid`'s response at `now` skips verification.
    ///
    /// Returns `false` when a check must run. In that case the check slot is
    /// claimed before the lock is released.
    pub fn should_bypass_check(&self, uid: WorkerId, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();

        let interval_elapsed = match state.last_check_at {
            None => true,
            // A clock that went backwards never opens the gate
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed > self.config.min_check_interval)
                .unwrap_or(false),
        };
        if !interval_elapsed {
            return true;
        }

        let has_queries = state
            .workers
            .get(&uid)
            .map(|w| w.query_count > 0)
            .unwrap_or(false);
        if !has_queries && !self.sample() {
            return true;
        }

        state.last_check_at = Some(now);
        debug!(uid, "Ground-truth check slot claimed");
        false
    }

    fn sample(&self) -> bool {
        if self.config.sample_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen::<f64>() < self.config.sample_rate
    }

    /// Blacklist `uid`. The first timestamp is kept.
    pub fn blacklist(&self, uid: WorkerId, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let entry = state.workers.entry(uid).or_default();
        if entry.blacklisted_at.is_none() {
            entry.blacklisted_at = Some(now);
            warn!(uid, at = %now, "Worker blacklisted");
        }
    }

    pub fn is_blacklisted(&self, uid: WorkerId) -> bool {
        self.blacklisted_at(uid).is_some()
    }

    pub fn blacklisted_at(&self, uid: WorkerId) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .workers
            .get(&uid)
            .and_then(|w| w.blacklisted_at)
    }

    pub fn reset_queries(&self, uid: WorkerId) {
        if let Some(entry) = self.state.lock().workers.get_mut(&uid) {
            entry.query_count = 0;
        }
    }

    pub fn snapshot(&self) -> ThrottleSnapshot {
        let state = self.state.lock();
        ThrottleSnapshot {
            last_check_at: state.last_check_at,
            workers: state.workers.clone(),
        }
    }
}

impl Default for ThrottleLedger {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}
