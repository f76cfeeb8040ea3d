//! Ground-truth source used to spot-check worker answers

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use compass_core::{Record, Result, ValidatorError};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const TWITTER_SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/all";

/// Results a single search returns
pub const SEARCH_MAX_RESULTS: u32 = 50;

/// Answers newer than this are searched up to their own timestamp
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Time range of a ground-truth search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SearchWindow {
    /// Earliest point any worker is expected to cover
    pub fn archive_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 5, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Window for checking an answer whose first item is `first_created_at`.
    ///
    /// A fresh answer bounds the search at its own timestamp so that items
    /// published after the worker answered are not counted against it.
    pub fn for_response(first_created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let fresh = (now - first_created_at)
            .to_std()
            .map(|age| age <= FRESHNESS_WINDOW)
            // Timestamps in the future count as fresh
            .unwrap_or(true);

        Self {
            start_time: Self::archive_start(),
            end_time: fresh.then_some(first_created_at),
        }
    }
}

#[async_trait]
pub trait GroundTruthSource: Send + Sync {
    async fn search(&self, query: &str, window: &SearchWindow) -> Result<Vec<Record>>;
}

/// Fraction of `response` items whose text appears in `truth`.
///
/// Either side empty yields 0.
pub fn match_ratio(response: &[Record], truth: &[Record]) -> f64 {
    if response.is_empty() || truth.is_empty() {
        return 0.0;
    }
    let known: HashSet<&str> = truth.iter().map(|r| r.text.as_str()).collect();
    let matches = response
        .iter()
        .filter(|r| known.contains(r.text.as_str()))
        .count();
    matches as f64 / response.len() as f64
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Record>,
}

/// Full-archive tweet search
pub struct TwitterSearchClient {
    url: String,
    bearer_token: String,
    client: reqwest::Client,
}

impl TwitterSearchClient {
    pub fn new(bearer_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_url(TWITTER_SEARCH_URL, bearer_token, timeout)
    }

    pub fn with_url(url: &str, bearer_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let bearer_token = bearer_token.into();
        if bearer_token.is_empty() {
            return Err(ValidatorError::Configuration(
                "ground-truth bearer token is empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            bearer_token,
            client,
        })
    }

    pub fn query_params(query: &str, window: &SearchWindow) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", query.to_string()),
            ("max_results", SEARCH_MAX_RESULTS.to_string()),
            ("start_time", window.start_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("user.fields", "id".to_string()),
            ("tweet.fields", "created_at".to_string()),
        ];
        if let Some(end) = window.end_time {
            params.push(("end_time", end.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        params
    }
}

#[async_trait]
impl GroundTruthSource for TwitterSearchClient {
    async fn search(&self, query: &str, window: &SearchWindow) -> Result<Vec<Record>> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.bearer_token)
            .query(&Self::query_params(query, window))
            .send()
            .await
            .map_err(|e| ValidatorError::GroundTruth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ValidatorError::GroundTruth(format!(
                "search returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ValidatorError::GroundTruth(format!("malformed search body: {}", e)))?;

        debug!(query, results = body.data.len(), "Ground-truth search complete");
        Ok(body.data)
    }
}
