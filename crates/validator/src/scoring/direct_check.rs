//! Self-verified responses
//!
//! Most answers are trusted. When the throttle opens, one answer is compared
//! against a ground-truth search; a worker that fails is blacklisted and
//! scored at the penalty from then on.

use super::{ScoringPlan, ScoringStrategy};
use crate::backend::{TaskBackend, TaskFeed};
use crate::config::StrategyKind;
use crate::ground_truth::{match_ratio, GroundTruthSource, SearchWindow};
use crate::throttle::ThrottleLedger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compass_core::{
    Result, Task, ValidatorError, WorkerId, WorkerResponse, DIRECT_CHECK_POOL_SIZE, FULL_SCORE,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DirectCheckStrategy {
    backend: Arc<dyn TaskBackend>,
    ground_truth: Arc<dyn GroundTruthSource>,
    ledger: Arc<ThrottleLedger>,
}

impl DirectCheckStrategy {
    pub fn new(
        backend: Arc<dyn TaskBackend>,
        ground_truth: Arc<dyn GroundTruthSource>,
        ledger: Arc<ThrottleLedger>,
    ) -> Self {
        Self {
            backend,
            ground_truth,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<ThrottleLedger> {
        &self.ledger
    }

    /// Compare the answer with a ground-truth search and return the match ratio
    async fn check(
        &self,
        task: &Task,
        response: &WorkerResponse,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        let records = response.records()?;
        let first_created_at = records
            .first()
            .and_then(|r| r.created_at)
            .ok_or_else(|| ValidatorError::InvalidResponse("answer has no timestamp".into()))?;

        let window = SearchWindow::for_response(first_created_at, now);
        let truth = self.ground_truth.search(&task.content, &window).await?;
        Ok(match_ratio(&records, &truth))
    }
}

#[async_trait]
impl ScoringStrategy for DirectCheckStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectCheck
    }

    fn plan(&self) -> ScoringPlan {
        ScoringPlan::PerResponse {
            pool_size: DIRECT_CHECK_POOL_SIZE,
        }
    }

    async fn next_tasks(&self, count: usize) -> Result<Vec<Task>> {
        self.backend.next_tasks(TaskFeed::Open, count).await
    }

    async fn score(&self, task: &Task, response: &WorkerResponse, uid: WorkerId) -> Result<f64> {
        let config = self.ledger.config();
        self.ledger.record_query(uid);

        if self.ledger.is_blacklisted(uid) {
            debug!(uid, "Blacklisted worker scored at penalty");
            return Ok(config.penalty_score);
        }

        let now = Utc::now();
        if self.ledger.should_bypass_check(uid, now) {
            return Ok(FULL_SCORE);
        }

        let ratio = self.check(task, response, now).await?;
        self.ledger.reset_queries(uid);

        if ratio >= config.match_threshold {
            info!(uid, ratio, "Worker passed ground-truth check");
            Ok(FULL_SCORE)
        } else {
            warn!(
                uid,
                ratio,
                threshold = config.match_threshold,
                "Worker failed ground-truth check"
            );
            self.ledger.blacklist(uid, now);
            Ok(config.penalty_score)
        }
    }
}
