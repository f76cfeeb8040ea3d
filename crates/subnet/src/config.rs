//! Registry gateway configuration

use compass_core::{DEFAULT_REGISTRY_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubnetConfig {
    /// Registry gateway HTTP endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Timeout in seconds for registry queries
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for SubnetConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}
