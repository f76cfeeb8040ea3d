//! In-memory task backend and ground-truth source for tests

use crate::backend::{TaskBackend, TaskFeed};
use crate::ground_truth::{GroundTruthSource, SearchWindow};
use async_trait::async_trait;
use compass_core::{Record, Result, ScoreTable, Task, ValidatorError, WorkerId, WorkerResponse};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A response registered with [`MockTaskBackend`]
pub type RegisteredResponse = (WorkerId, String, WorkerResponse);

/// Scripted task backend.
///
/// Hands out `task-{n}` prompts, scores every registered answer at 1.0
/// unless a per-worker score or failure is scripted.
#[derive(Default)]
pub struct MockTaskBackend {
    task_limit: Option<usize>,
    scores: HashMap<WorkerId, f64>,
    failing_scores: HashSet<WorkerId>,
    blacklist: HashSet<WorkerId>,
    votes: ScoreTable,
    fail_tasks: bool,
    fail_blacklist: bool,
    fail_votes: bool,
    issued: AtomicUsize,
    feeds: Mutex<Vec<TaskFeed>>,
    registered: Mutex<Vec<RegisteredResponse>>,
}

impl MockTaskBackend {
    pub fn builder() -> MockTaskBackendBuilder {
        MockTaskBackendBuilder::default()
    }

    /// Feeds requested, in call order
    pub fn feeds(&self) -> Vec<TaskFeed> {
        self.feeds.lock().clone()
    }

    pub fn registered(&self) -> Vec<RegisteredResponse> {
        self.registered.lock().clone()
    }
}

#[async_trait]
impl TaskBackend for MockTaskBackend {
    async fn next_tasks(&self, feed: TaskFeed, count: usize) -> Result<Vec<Task>> {
        self.feeds.lock().push(feed);
        if self.fail_tasks {
            return Err(ValidatorError::Backend("cant get prompt".into()));
        }

        let count = self.task_limit.map_or(count, |limit| count.min(limit));
        let first = self.issued.fetch_add(count, Ordering::SeqCst);
        Ok((first..first + count)
            .map(|n| Task::new(format!("task-{}", n), format!("query {}", n)))
            .collect())
    }

    async fn register_response(
        &self,
        uid: WorkerId,
        task: &Task,
        response: &WorkerResponse,
    ) -> Result<f64> {
        self.registered
            .lock()
            .push((uid, task.id.clone(), response.clone()));
        if self.failing_scores.contains(&uid) {
            return Err(ValidatorError::Backend("connection reset".into()));
        }
        Ok(self.scores.get(&uid).copied().unwrap_or(1.0))
    }

    async fn blacklisted_ids(&self) -> Result<HashSet<WorkerId>> {
        if self.fail_blacklist {
            return Err(ValidatorError::Backend("cant get BL".into()));
        }
        Ok(self.blacklist.clone())
    }

    async fn latest_votes(&self) -> Result<ScoreTable> {
        if self.fail_votes {
            return Err(ValidatorError::Backend("cant get latest voting".into()));
        }
        Ok(self.votes.clone())
    }
}

#[derive(Default)]
pub struct MockTaskBackendBuilder {
    backend: MockTaskBackend,
}

impl MockTaskBackendBuilder {
    /// Cap the number of tasks any single request returns
    pub fn task_limit(mut self, limit: usize) -> Self {
        self.backend.task_limit = Some(limit);
        self
    }

    pub fn score(mut self, uid: WorkerId, score: f64) -> Self {
        self.backend.scores.insert(uid, score);
        self
    }

    pub fn fail_scoring(mut self, uid: WorkerId) -> Self {
        self.backend.failing_scores.insert(uid);
        self
    }

    pub fn blacklist(mut self, uids: impl IntoIterator<Item = WorkerId>) -> Self {
        self.backend.blacklist.extend(uids);
        self
    }

    pub fn vote(mut self, uid: WorkerId, score: f64) -> Self {
        self.backend.votes.insert(uid, score);
        self
    }

    pub fn fail_tasks(mut self) -> Self {
        self.backend.fail_tasks = true;
        self
    }

    pub fn fail_blacklist(mut self) -> Self {
        self.backend.fail_blacklist = true;
        self
    }

    pub fn fail_votes(mut self) -> Self {
        self.backend.fail_votes = true;
        self
    }

    pub fn build(self) -> MockTaskBackend {
        self.backend
    }
}

/// Ground-truth source returning a fixed result set
pub struct MockGroundTruth {
    records: Vec<Record>,
    fail: bool,
    queries: Mutex<Vec<(String, SearchWindow)>>,
}

impl MockGroundTruth {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn windows(&self) -> Vec<SearchWindow> {
        self.queries.lock().iter().map(|(_, w)| *w).collect()
    }
}

#[async_trait]
impl GroundTruthSource for MockGroundTruth {
    async fn search(&self, query: &str, window: &SearchWindow) -> Result<Vec<Record>> {
        self.queries.lock().push((query.to_string(), *window));
        if self.fail {
            return Err(ValidatorError::GroundTruth("429 Too Many Requests".into()));
        }
        Ok(self.records.clone())
    }
}
