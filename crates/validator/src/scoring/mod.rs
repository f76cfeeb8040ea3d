//! Scoring strategies
//!
//! A strategy decides where tasks come from and how a worker answer becomes a
//! score in `[0, 1]`. Per-response strategies go through the dispatcher; the
//! aggregated strategy hands the orchestrator a finished score table.

mod delegated;
mod direct_check;
mod passthrough;

pub use delegated::DelegatedStrategy;
pub use direct_check::DirectCheckStrategy;
pub use passthrough::PassthroughStrategy;

use crate::backend::TaskBackend;
use crate::config::StrategyKind;
use crate::ground_truth::GroundTruthSource;
use crate::throttle::ThrottleLedger;
use async_trait::async_trait;
use compass_core::{Result, ScoreTable, Task, ValidatorError, WorkerId, WorkerResponse};
use std::collections::HashSet;
use std::sync::Arc;

/// How the orchestrator obtains scores from a strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoringPlan {
    /// Dispatch one task per worker and score each answer
    PerResponse { pool_size: usize },
    /// Take a precomputed score table
    Aggregated,
}

#[async_trait]
pub trait ScoringStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn plan(&self) -> ScoringPlan;

    /// Workers to leave out of this iteration
    async fn excluded_workers(&self) -> Result<HashSet<WorkerId>> {
        Ok(HashSet::new())
    }

    async fn next_tasks(&self, _count: usize) -> Result<Vec<Task>> {
        Err(ValidatorError::Configuration(format!(
            "{} strategy does not hand out tasks",
            self.kind()
        )))
    }

    async fn score(&self, _task: &Task, _response: &WorkerResponse, _uid: WorkerId) -> Result<f64> {
        Err(ValidatorError::Configuration(format!(
            "{} strategy does not score responses",
            self.kind()
        )))
    }

    async fn aggregated_scores(&self) -> Result<ScoreTable> {
        Err(ValidatorError::Configuration(format!(
            "{} strategy has no aggregated scores",
            self.kind()
        )))
    }
}

/// Build the strategy selected by `kind`.
///
/// The ledger stays with the caller; only the direct-check strategy uses it.
pub fn build_strategy(
    kind: StrategyKind,
    backend: Arc<dyn TaskBackend>,
    ground_truth: Option<Arc<dyn GroundTruthSource>>,
    ledger: Arc<ThrottleLedger>,
) -> Result<Arc<dyn ScoringStrategy>> {
    let strategy: Arc<dyn ScoringStrategy> = match kind {
        StrategyKind::Delegated => Arc::new(DelegatedStrategy::new(backend)),
        StrategyKind::DirectCheck => {
            let ground_truth = ground_truth.ok_or_else(|| {
                ValidatorError::Configuration(
                    "direct-check strategy needs a ground-truth source".into(),
                )
            })?;
            ledger.config().validate()?;
            Arc::new(DirectCheckStrategy::new(backend, ground_truth, ledger))
        }
        StrategyKind::Passthrough => Arc::new(PassthroughStrategy::new(backend)),
    };
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottleConfig;
    use crate::mock::{MockGroundTruth, MockTaskBackend};
    use chrono::Utc;

    #[test]
    fn test_build_each_strategy() {
        let backend: Arc<dyn TaskBackend> = Arc::new(MockTaskBackend::builder().build());
        let truth: Arc<dyn GroundTruthSource> = Arc::new(MockGroundTruth::new(Vec::new()));

        for kind in [
            StrategyKind::Delegated,
            StrategyKind::DirectCheck,
            StrategyKind::Passthrough,
        ] {
            let strategy = build_strategy(
                kind,
                backend.clone(),
                Some(truth.clone()),
                Arc::new(ThrottleLedger::default()),
            )
            .unwrap();
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[test]
    fn test_direct_check_requires_ground_truth() {
        let backend: Arc<dyn TaskBackend> = Arc::new(MockTaskBackend::builder().build());
        let result = build_strategy(
            StrategyKind::DirectCheck,
            backend,
            None,
            Arc::new(ThrottleLedger::default()),
        );
        assert!(matches!(result, Err(ValidatorError::Configuration(_))));
    }

    #[test]
    fn test_direct_check_rejects_invalid_throttle() {
        let backend: Arc<dyn TaskBackend> = Arc::new(MockTaskBackend::builder().build());
        let truth: Arc<dyn GroundTruthSource> = Arc::new(MockGroundTruth::new(Vec::new()));
        let ledger = Arc::new(ThrottleLedger::new(ThrottleConfig {
            match_threshold: 1.5,
            ..Default::default()
        }));

        let result = build_strategy(StrategyKind::DirectCheck, backend, Some(truth), ledger);
        assert!(matches!(result, Err(ValidatorError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_direct_check_shares_callers_ledger() {
        let backend: Arc<dyn TaskBackend> = Arc::new(MockTaskBackend::builder().build());
        let truth: Arc<dyn GroundTruthSource> = Arc::new(MockGroundTruth::new(Vec::new()));
        let ledger = Arc::new(ThrottleLedger::default());
        ledger.blacklist(7, Utc::now());

        let strategy = build_strategy(
            StrategyKind::DirectCheck,
            backend,
            Some(truth),
            ledger.clone(),
        )
        .unwrap();
        let response = WorkerResponse::new(serde_json::json!(["x"]));
        strategy.score(&Task::new("", "q"), &response, 7).await.unwrap();

        assert_eq!(ledger.query_count(7), 1);
        assert!(ledger.is_blacklisted(7));
    }

    #[tokio::test]
    async fn test_aggregated_strategy_refuses_per_response_calls() {
        let backend: Arc<dyn TaskBackend> = Arc::new(MockTaskBackend::builder().build());
        let strategy = PassthroughStrategy::new(backend);

        assert!(strategy.next_tasks(3).await.is_err());
        let response = WorkerResponse::new(serde_json::json!(["x"]));
        assert!(strategy.score(&Task::new("p", "q"), &response, 1).await.is_err());
    }
}
