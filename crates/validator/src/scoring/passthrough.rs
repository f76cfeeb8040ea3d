//! Copy the backend's aggregated vote

use super::{ScoringPlan, ScoringStrategy};
use crate::backend::TaskBackend;
use crate::config::StrategyKind;
use async_trait::async_trait;
use compass_core::{Result, ScoreTable};
use std::sync::Arc;
use tracing::debug;

pub struct PassthroughStrategy {
    backend: Arc<dyn TaskBackend>,
}

impl PassthroughStrategy {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ScoringStrategy for PassthroughStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Passthrough
    }

    fn plan(&self) -> ScoringPlan {
        ScoringPlan::Aggregated
    }

    async fn aggregated_scores(&self) -> Result<ScoreTable> {
        let votes = self.backend.latest_votes().await?;
        debug!(entries = votes.len(), "Fetched aggregated vote");
        Ok(votes)
    }
}
