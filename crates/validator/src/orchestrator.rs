//! Validation loop
//!
//! Each iteration resolves the worker roster, hands every worker one task,
//! scores the answers through the configured strategy, normalizes the scores
//! into integer weights and submits them. Iterations start on a fixed cadence
//! and never overlap.

use crate::config::ValidatorSettings;
use crate::dispatcher::{Assignment, WorkerDispatcher};
use crate::scoring::{ScoringPlan, ScoringStrategy};
use chrono::{DateTime, Utc};
use compass_core::{
    filter_dialable, is_valid_score, normalize_scores, Keypair, Result, ScoreTable,
    ValidatorError, WeightTable, WorkerEndpoint, WorkerId,
};
use compass_subnet::{SubnetRegistry, WorkerTransport};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What the orchestrator is doing right now
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IterationPhase {
    #[default]
    Idle,
    FetchingAddresses,
    FetchingTasks,
    Dispatching,
    Scoring,
    Normalizing,
    Submitting,
    Sleeping,
}

/// Why an iteration ended without a weight submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbandonReason {
    RegistryUnavailable(String),
    BackendUnavailable(String),
    NoWorkers,
    NoScores,
    NoWeights,
    SubmissionFailed(String),
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::RegistryUnavailable(e) => write!(f, "registry unavailable: {}", e),
            AbandonReason::BackendUnavailable(e) => write!(f, "backend unavailable: {}", e),
            AbandonReason::NoWorkers => write!(f, "no eligible workers"),
            AbandonReason::NoScores => write!(f, "no worker was scored"),
            AbandonReason::NoWeights => write!(f, "scores normalized to no weights"),
            AbandonReason::SubmissionFailed(e) => write!(f, "weight submission failed: {}", e),
        }
    }
}

/// Result of one iteration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    Submitted { weights: WeightTable },
    Abandoned(AbandonReason),
}

impl IterationOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, IterationOutcome::Submitted { .. })
    }
}

/// Intermediate iteration result; `Err` ends the iteration without a vote
type Stage<T> = std::result::Result<T, AbandonReason>;

/// Orchestrator status
#[derive(Clone, Debug, Default)]
pub struct OrchestratorStatus {
    pub phase: IterationPhase,
    pub iterations: u64,
    pub submissions: u64,
    pub abandoned: u64,
    pub last_outcome: Option<IterationOutcome>,
    pub last_submission_at: Option<DateTime<Utc>>,
}

/// Drives validation iterations for one subnet
pub struct ValidationOrchestrator {
    settings: ValidatorSettings,
    netuid: u16,
    signer: Arc<Keypair>,
    registry: Arc<dyn SubnetRegistry>,
    transport: Arc<dyn WorkerTransport>,
    strategy: Arc<dyn ScoringStrategy>,
    status: RwLock<OrchestratorStatus>,
}

impl ValidationOrchestrator {
    pub fn new(
        settings: ValidatorSettings,
        netuid: u16,
        signer: Arc<Keypair>,
        registry: Arc<dyn SubnetRegistry>,
        transport: Arc<dyn WorkerTransport>,
        strategy: Arc<dyn ScoringStrategy>,
    ) -> Self {
        Self {
            settings,
            netuid,
            signer,
            registry,
            transport,
            strategy,
            status: RwLock::new(OrchestratorStatus::default()),
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    pub fn netuid(&self) -> u16 {
        self.netuid
    }

    pub fn status(&self) -> OrchestratorStatus {
        self.status.read().clone()
    }

    fn set_phase(&self, phase: IterationPhase) {
        self.status.write().phase = phase;
    }

    fn record_outcome(&self, outcome: &IterationOutcome) {
        let mut status = self.status.write();
        status.phase = IterationPhase::Idle;
        status.iterations += 1;
        match outcome {
            IterationOutcome::Submitted { .. } => {
                status.submissions += 1;
                status.last_submission_at = Some(Utc::now());
            }
            IterationOutcome::Abandoned(_) => status.abandoned += 1,
        }
        status.last_outcome = Some(outcome.clone());
    }

    /// Run one iteration.
    ///
    /// Only fatal errors are returned as `Err`; every recoverable failure
    /// ends the iteration as [`IterationOutcome::Abandoned`].
    pub async fn run_iteration(&self) -> Result<IterationOutcome> {
        let result = match self.strategy.plan() {
            ScoringPlan::PerResponse { pool_size } => self.collect_scores(pool_size).await,
            ScoringPlan::Aggregated => self.collect_aggregated().await,
        };

        let outcome = match result {
            Ok(Ok(scores)) => self.normalize_and_submit(scores).await,
            Ok(Err(reason)) => IterationOutcome::Abandoned(reason),
            Err(e) => {
                self.set_phase(IterationPhase::Idle);
                return Err(e);
            }
        };

        if let IterationOutcome::Abandoned(reason) = &outcome {
            warn!(netuid = self.netuid, reason = %reason, "Iteration abandoned");
        }
        self.record_outcome(&outcome);
        Ok(outcome)
    }

    /// Resolve the roster, dispatch tasks and score every answer
    async fn collect_scores(&self, pool_size: usize) -> Result<Stage<ScoreTable>> {
        self.set_phase(IterationPhase::FetchingAddresses);

        let roster = match self.resolve_roster().await? {
            Ok(roster) => roster,
            Err(reason) => return Ok(Err(reason)),
        };
        if roster.is_empty() {
            return Ok(Err(AbandonReason::NoWorkers));
        }

        self.set_phase(IterationPhase::FetchingTasks);
        let tasks = match self.strategy.next_tasks(roster.len()).await {
            Ok(tasks) => tasks,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(Err(AbandonReason::BackendUnavailable(e.to_string()))),
        };
        if tasks.is_empty() {
            return Ok(Err(AbandonReason::BackendUnavailable(
                "backend returned no tasks".into(),
            )));
        }
        if tasks.len() < roster.len() {
            warn!(
                workers = roster.len(),
                tasks = tasks.len(),
                "Fewer tasks than workers, truncating roster"
            );
        }

        let assignments: Vec<Assignment> = roster
            .into_iter()
            .zip(tasks)
            .map(|((uid, endpoint), task)| (uid, endpoint, task))
            .collect();

        self.set_phase(IterationPhase::Dispatching);
        info!(
            workers = assignments.len(),
            pool_size,
            strategy = %self.strategy.kind(),
            "Dispatching tasks"
        );
        let dispatcher =
            WorkerDispatcher::new(self.transport.clone(), self.signer.clone(), pool_size);
        let answers = dispatcher
            .dispatch_all(assignments, self.settings.call_timeout)
            .await;

        self.set_phase(IterationPhase::Scoring);
        let mut scores = ScoreTable::new();
        for (uid, task, response) in answers {
            let Some(response) = response else {
                continue;
            };

            match self.strategy.score(&task, &response, uid).await {
                Ok(score) if is_valid_score(score) => {
                    debug!(uid, score, "Worker scored");
                    scores.insert(uid, score);
                }
                Ok(score) => warn!(uid, score, "Dropping out-of-range score"),
                Err(e) => warn!(uid, error = %e, "Scoring failed, skipping worker"),
            }

            if !self.settings.scoring_pause.is_zero() {
                tokio::time::sleep(self.settings.scoring_pause).await;
            }
        }

        Ok(Ok(scores))
    }

    /// Workers with a key, a dialable address and no exclusion, in uid order
    async fn resolve_roster(
        &self,
    ) -> Result<Stage<Vec<(WorkerId, WorkerEndpoint)>>> {
        let addresses = match self.registry.list_worker_addresses(self.netuid).await {
            Ok(addresses) => addresses,
            Err(e) => return Ok(Err(AbandonReason::RegistryUnavailable(e.to_string()))),
        };
        let keys = match self.registry.list_worker_keys(self.netuid).await {
            Ok(keys) => keys,
            Err(e) => return Ok(Err(AbandonReason::RegistryUnavailable(e.to_string()))),
        };

        let own_key = self.signer.hotkey();
        if !keys.values().any(|key| *key == own_key) {
            error!(key = %self.signer.ss58_address(), "Validator key is not registered");
            return Err(ValidatorError::Registration(format!(
                "validator key {} is not registered in subnet {}",
                self.signer.ss58_address(),
                self.netuid
            )));
        }

        let excluded = match self.strategy.excluded_workers().await {
            Ok(excluded) => excluded,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(Err(AbandonReason::BackendUnavailable(e.to_string()))),
        };

        let registered = addresses.len();
        let roster: Vec<_> = filter_dialable(&addresses)
            .into_iter()
            .filter_map(|(uid, address)| {
                if excluded.contains(&uid) {
                    debug!(uid, "Worker excluded by strategy");
                    return None;
                }
                match keys.get(&uid) {
                    Some(hotkey) => Some((uid, WorkerEndpoint::new(address, *hotkey))),
                    None => {
                        debug!(uid, address = %address, "Worker has no key");
                        None
                    }
                }
            })
            .collect();

        info!(
            registered,
            eligible = roster.len(),
            excluded = excluded.len(),
            "Resolved worker roster"
        );
        Ok(Ok(roster))
    }

    async fn collect_aggregated(&self) -> Result<Stage<ScoreTable>> {
        self.set_phase(IterationPhase::FetchingTasks);
        match self.strategy.aggregated_scores().await {
            Ok(raw) => {
                let mut scores = ScoreTable::new();
                for (uid, score) in raw {
                    if is_valid_score(score) {
                        scores.insert(uid, score);
                    } else {
                        warn!(uid, score, "Dropping out-of-range score");
                    }
                }
                Ok(Ok(scores))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Err(AbandonReason::BackendUnavailable(e.to_string()))),
        }
    }

    async fn normalize_and_submit(&self, scores: ScoreTable) -> IterationOutcome {
        if scores.is_empty() {
            return IterationOutcome::Abandoned(AbandonReason::NoScores);
        }

        self.set_phase(IterationPhase::Normalizing);
        let weights = match normalize_scores(
            &scores,
            self.settings.max_allowed_weights,
            self.settings.weight_budget,
        ) {
            Ok(weights) if !weights.is_empty() => weights,
            Ok(_) => return IterationOutcome::Abandoned(AbandonReason::NoWeights),
            Err(e) => {
                debug!(error = %e, "Normalization failed");
                return IterationOutcome::Abandoned(AbandonReason::NoWeights);
            }
        };

        self.set_phase(IterationPhase::Submitting);
        match self
            .registry
            .submit_weights(self.netuid, &self.signer, &weights)
            .await
        {
            Ok(()) => {
                info!(netuid = self.netuid, entries = weights.len(), "Weight vote submitted");
                IterationOutcome::Submitted { weights }
            }
            Err(e) => IterationOutcome::Abandoned(AbandonReason::SubmissionFailed(e.to_string())),
        }
    }

    /// Run iterations until a fatal error
    pub async fn run(&self) -> Result<()> {
        self.run_loop(None).await
    }

    /// Run at most `count` iterations on the normal cadence
    pub async fn run_iterations(&self, count: u64) -> Result<()> {
        self.run_loop(Some(count)).await
    }

    async fn run_loop(&self, limit: Option<u64>) -> Result<()> {
        info!(
            netuid = self.netuid,
            strategy = %self.strategy.kind(),
            interval_secs = self.settings.iteration_interval.as_secs(),
            "Starting validation loop"
        );

        let mut completed = 0u64;
        loop {
            if limit.is_some_and(|n| completed >= n) {
                return Ok(());
            }

            let started = Instant::now();
            match self.run_iteration().await {
                Ok(IterationOutcome::Submitted { weights }) => {
                    info!(entries = weights.len(), "Iteration complete");
                }
                Ok(IterationOutcome::Abandoned(_)) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal error, stopping validation loop");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Iteration failed"),
            }
            completed += 1;

            if limit.is_some_and(|n| completed >= n) {
                return Ok(());
            }

            let elapsed = started.elapsed();
            if let Some(remaining) = self.settings.iteration_interval.checked_sub(elapsed) {
                if !remaining.is_zero() {
                    self.set_phase(IterationPhase::Sleeping);
                    debug!(sleep_ms = remaining.as_millis() as u64, "Waiting for next iteration");
                    tokio::time::sleep(remaining).await;
                    self.set_phase(IterationPhase::Idle);
                }
            } else {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Iteration overran the interval, starting next one immediately"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTaskBackend;
    use crate::scoring::{DelegatedStrategy, PassthroughStrategy};
    use compass_subnet::mock::{hotkey_from_seed, MockRegistry, MockTransport};
    use serde_json::json;
    use std::time::Duration;

    fn settings() -> ValidatorSettings {
        ValidatorSettings {
            scoring_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    fn orchestrator(
        registry: Arc<MockRegistry>,
        transport: Arc<MockTransport>,
        strategy: Arc<dyn ScoringStrategy>,
        keypair: Keypair,
    ) -> ValidationOrchestrator {
        ValidationOrchestrator::new(settings(), 1, Arc::new(keypair), registry, transport, strategy)
    }

    #[tokio::test]
    async fn test_status_tracks_outcomes() {
        let keypair = Keypair::generate();
        let registry = Arc::new(
            MockRegistry::builder()
                .validator(0, &keypair)
                .worker(1, "10.0.0.1:8000", hotkey_from_seed(1))
                .build(),
        );
        let transport = MockTransport::new().answer("10.0.0.1:8000", json!(["a"])).into_arc();
        let backend = Arc::new(MockTaskBackend::builder().build());
        let orchestrator = orchestrator(
            registry,
            transport,
            Arc::new(DelegatedStrategy::new(backend)),
            keypair,
        );

        let outcome = orchestrator.run_iteration().await.unwrap();
        assert!(outcome.is_submitted());

        let status = orchestrator.status();
        assert_eq!(status.phase, IterationPhase::Idle);
        assert_eq!(status.iterations, 1);
        assert_eq!(status.submissions, 1);
        assert!(status.last_submission_at.is_some());
        assert_eq!(status.last_outcome, Some(outcome));
    }

    #[tokio::test]
    async fn test_out_of_range_votes_are_dropped() {
        let keypair = Keypair::generate();
        let registry = Arc::new(MockRegistry::builder().build());
        let backend = Arc::new(
            MockTaskBackend::builder()
                .vote(1, 1.5)
                .vote(2, -0.1)
                .vote(3, 0.5)
                .build(),
        );
        let orchestrator = orchestrator(
            registry.clone(),
            MockTransport::new().into_arc(),
            Arc::new(PassthroughStrategy::new(backend)),
            keypair,
        );

        let outcome = orchestrator.run_iteration().await.unwrap();
        let expected: WeightTable = [(3, 10_000)].into_iter().collect();
        assert_eq!(outcome, IterationOutcome::Submitted { weights: expected });
        assert_eq!(registry.address_queries(), 0);
    }

    #[test]
    fn test_abandon_reason_display() {
        assert_eq!(AbandonReason::NoWorkers.to_string(), "no eligible workers");
        assert!(AbandonReason::SubmissionFailed("rejected".into())
            .to_string()
            .contains("rejected"));
    }
}
