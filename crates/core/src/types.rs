//! Core types shared by the registry client and the validator

use crate::{Result, ValidatorError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sp_core::crypto::{AccountId32, Ss58Codec};
use std::collections::BTreeMap;
use std::fmt;

/// Worker uid within a subnet
pub type WorkerId = u16;

/// Per-iteration scores, keyed by uid. Iteration order is the tie-break order for truncation.
pub type ScoreTable = BTreeMap<WorkerId, f64>;

/// Integer weights ready for submission
pub type WeightTable = BTreeMap<WorkerId, u16>;

/// Returns true for scores the registry may receive (finite, within `[0, 1]`)
pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=1.0).contains(&score)
}

/// Worker or validator hotkey (32 byte sr25519 public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hotkey(pub [u8; 32]);

impl Hotkey {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 32 {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().and_then(|b| Self::from_bytes(&b))
    }

    /// SS58 address with the generic Substrate prefix (42)
    pub fn to_ss58(&self) -> String {
        AccountId32::new(self.0).to_ss58check()
    }

    pub fn from_ss58(address: &str) -> Option<Self> {
        let account = AccountId32::from_ss58check(address).ok()?;
        let bytes: &[u8; 32] = account.as_ref();
        Some(Self(*bytes))
    }
}

impl fmt::Debug for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hotkey({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ss58())
    }
}

/// Network location and identity of a worker, resolved fresh every iteration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    /// `ip:port`
    pub address: String,
    pub hotkey: Hotkey,
}

impl WorkerEndpoint {
    pub fn new(address: impl Into<String>, hotkey: Hotkey) -> Self {
        Self {
            address: address.into(),
            hotkey,
        }
    }
}

/// A prompt handed to exactly one worker per iteration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Backend prompt id; the open feed may omit it
    #[serde(rename = "promptId", alias = "id", default)]
    pub id: String,
    #[serde(rename = "query", alias = "content")]
    pub content: String,
}

impl Task {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// One timestamped item of a worker answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(text: impl Into<String>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            text: text.into(),
            created_at,
        }
    }
}

/// Raw worker answer. Opaque except to strategies that inspect it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerResponse(pub serde_json::Value);

impl WorkerResponse {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn from_records(records: &[Record]) -> Self {
        Self(serde_json::to_value(records).unwrap_or(serde_json::Value::Null))
    }

    /// Null, empty strings and empty collections count as "no answer"
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Interpret the answer as a list of records
    pub fn records(&self) -> Result<Vec<Record>> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| ValidatorError::InvalidResponse(format!("expected record list: {}", e)))
    }

    /// JSON text of the answer, as forwarded to the scoring backend
    pub fn to_content_string(&self) -> String {
        self.0.to_string()
    }
}
