//! Backend-scored responses

use super::{ScoringPlan, ScoringStrategy};
use crate::backend::{TaskBackend, TaskFeed};
use crate::config::StrategyKind;
use async_trait::async_trait;
use compass_core::{Result, Task, WorkerId, WorkerResponse, DELEGATED_POOL_SIZE};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct DelegatedStrategy {
    backend: Arc<dyn TaskBackend>,
}

impl DelegatedStrategy {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ScoringStrategy for DelegatedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Delegated
    }

    fn plan(&self) -> ScoringPlan {
        ScoringPlan::PerResponse {
            pool_size: DELEGATED_POOL_SIZE,
        }
    }

    async fn excluded_workers(&self) -> Result<HashSet<WorkerId>> {
        self.backend.blacklisted_ids().await
    }

    async fn next_tasks(&self, count: usize) -> Result<Vec<Task>> {
        self.backend.next_tasks(TaskFeed::Keyed, count).await
    }

    async fn score(&self, task: &Task, response: &WorkerResponse, uid: WorkerId) -> Result<f64> {
        let score = self.backend.register_response(uid, task, response).await?;
        debug!(uid, prompt = %task.id, score, "Backend scored response");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTaskBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_uses_keyed_feed_and_backend_blacklist() {
        let backend = Arc::new(MockTaskBackend::builder().blacklist([2, 5]).build());
        let strategy = DelegatedStrategy::new(backend.clone());

        let tasks = strategy.next_tasks(3).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(backend.feeds(), vec![TaskFeed::Keyed]);

        let excluded = strategy.excluded_workers().await.unwrap();
        assert_eq!(excluded, [2, 5].into_iter().collect());
        assert_eq!(
            strategy.plan(),
            ScoringPlan::PerResponse { pool_size: 8 }
        );
    }

    #[tokio::test]
    async fn test_score_comes_from_backend() {
        let backend = Arc::new(MockTaskBackend::builder().score(1, 0.75).build());
        let strategy = DelegatedStrategy::new(backend.clone());
        let task = Task::new("p1", "eth");
        let response = WorkerResponse::new(json!([{"text": "eth up"}]));

        assert_eq!(strategy.score(&task, &response, 1).await.unwrap(), 0.75);

        let registered = backend.registered();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].0, 1);
        assert_eq!(registered[0].1, "p1");
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let backend = Arc::new(MockTaskBackend::builder().fail_scoring(3).build());
        let strategy = DelegatedStrategy::new(backend);
        let response = WorkerResponse::new(json!(["x"]));

        assert!(strategy
            .score(&Task::new("p", "q"), &response, 3)
            .await
            .is_err());
    }
}
