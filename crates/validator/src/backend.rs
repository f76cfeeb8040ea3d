//! Task backend: prompts, delegated scoring, blacklist and aggregated votes

use async_trait::async_trait;
use compass_core::{Result, ScoreTable, Task, ValidatorError, WorkerId, WorkerResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Which prompt queue the validator draws from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskFeed {
    /// Authenticated queue whose answers are registered back for scoring
    Keyed,
    /// Public queue
    Open,
}

impl TaskFeed {
    pub fn path(&self) -> &'static str {
        match self {
            TaskFeed::Keyed => "/subnet/getNextRequests",
            TaskFeed::Open => "/subnet/getNextOpenRequests",
        }
    }
}

#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Up to `count` prompts from `feed`
    async fn next_tasks(&self, feed: TaskFeed, count: usize) -> Result<Vec<Task>>;

    /// Register a worker answer and return the score the backend assigns
    async fn register_response(
        &self,
        uid: WorkerId,
        task: &Task,
        response: &WorkerResponse,
    ) -> Result<f64>;

    /// Workers the backend refuses to score
    async fn blacklisted_ids(&self) -> Result<HashSet<WorkerId>>;

    /// Most recent aggregated vote, keyed by uid
    async fn latest_votes(&self) -> Result<ScoreTable>;
}

/// Parse uid keys that arrive as JSON strings
pub fn parse_vote_table(raw: BTreeMap<String, f64>) -> ScoreTable {
    let mut table = ScoreTable::new();
    for (key, score) in raw {
        match key.trim().parse::<WorkerId>() {
            Ok(uid) => {
                table.insert(uid, score);
            }
            Err(_) => warn!(key = %key, "Skipping vote with invalid uid"),
        }
    }
    table
}

/// Blacklisted ids may be numbers or numeric strings
pub fn parse_blacklist(raw: Vec<Value>) -> HashSet<WorkerId> {
    raw.into_iter()
        .filter_map(|value| match &value {
            Value::Number(n) => n.as_u64().and_then(|n| WorkerId::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<WorkerId>().ok(),
            _ => None,
        })
        .collect()
}

/// HTTP client for the market-compass subnet API
pub struct HttpTaskBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTaskBackend {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| ValidatorError::Backend(format!("{}: {}", what, e)))?;

        if !response.status().is_success() {
            return Err(ValidatorError::Backend(format!(
                "{} returned {}",
                what,
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ValidatorError::Backend(format!("{}: malformed body: {}", what, e)))
    }
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn next_tasks(&self, feed: TaskFeed, count: usize) -> Result<Vec<Task>> {
        let url = format!("{}{}", self.base_url, feed.path());
        let mut request = self.client.get(&url).query(&[("count", count)]);
        if feed == TaskFeed::Keyed {
            request = self.with_key(request);
        }
        let tasks: Vec<Task> = self.get_json(request, "next tasks").await?;
        debug!(requested = count, received = tasks.len(), "Fetched tasks");
        Ok(tasks)
    }

    async fn register_response(
        &self,
        uid: WorkerId,
        task: &Task,
        response: &WorkerResponse,
    ) -> Result<f64> {
        let url = format!("{}/subnet/registerResponse", self.base_url);
        let form = [
            ("content", response.to_content_string()),
            ("minerId", uid.to_string()),
            ("promptId", task.id.clone()),
        ];

        let reply = self
            .with_key(self.client.post(&url))
            .form(&form)
            .send()
            .await
            .map_err(|e| ValidatorError::Backend(format!("register response: {}", e)))?;

        if !reply.status().is_success() {
            warn!(uid, status = %reply.status(), "Backend rejected response, scoring zero");
            return Ok(0.0);
        }

        let text = reply
            .text()
            .await
            .map_err(|e| ValidatorError::Backend(format!("register response: {}", e)))?;
        text.trim().parse::<f64>().map_err(|_| {
            ValidatorError::Backend(format!("register response: score is not a number: {:?}", text))
        })
    }

    async fn blacklisted_ids(&self) -> Result<HashSet<WorkerId>> {
        let url = format!("{}/subnet/blacklistedIds", self.base_url);
        let raw: Vec<Value> = self.get_json(self.client.get(&url), "blacklist").await?;
        Ok(parse_blacklist(raw))
    }

    async fn latest_votes(&self) -> Result<ScoreTable> {
        let url = format!("{}/subnet/getLatestVoting", self.base_url);
        let raw: BTreeMap<String, f64> = self
            .get_json(self.client.get(&url), "latest voting")
            .await?;
        Ok(parse_vote_table(raw))
    }
}
