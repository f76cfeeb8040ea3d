//! HTTP client for the registry gateway

use crate::auth::SignedHeaders;
use crate::{SubnetConfig, SubnetRegistry};
use async_trait::async_trait;
use compass_core::{Hotkey, Keypair, Result, ValidatorError, WeightTable, WorkerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of a weight vote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct WeightVote {
    pub uids: Vec<WorkerId>,
    pub weights: Vec<u16>,
}

impl From<&WeightTable> for WeightVote {
    fn from(table: &WeightTable) -> Self {
        Self {
            uids: table.keys().copied().collect(),
            weights: table.values().copied().collect(),
        }
    }
}

/// Registry gateway client
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(config: &SubnetConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ValidatorError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ValidatorError::Transport(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ValidatorError::Transport(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ValidatorError::Serialization(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl SubnetRegistry for HttpRegistryClient {
    async fn subnet_names(&self) -> Result<BTreeMap<u16, String>> {
        self.get_json("/subnets").await
    }

    async fn list_worker_addresses(&self, netuid: u16) -> Result<BTreeMap<WorkerId, String>> {
        self.get_json(&format!("/subnets/{}/addresses", netuid))
            .await
    }

    async fn list_worker_keys(&self, netuid: u16) -> Result<BTreeMap<WorkerId, Hotkey>> {
        let raw: BTreeMap<WorkerId, String> =
            self.get_json(&format!("/subnets/{}/keys", netuid)).await?;

        let mut keys = BTreeMap::new();
        for (uid, ss58) in raw {
            match Hotkey::from_ss58(&ss58) {
                Some(hotkey) => {
                    keys.insert(uid, hotkey);
                }
                None => warn!(uid, key = %ss58, "Skipping worker with malformed key"),
            }
        }
        Ok(keys)
    }

    async fn submit_weights(
        &self,
        netuid: u16,
        signer: &Keypair,
        weights: &WeightTable,
    ) -> Result<()> {
        let url = format!("{}/subnets/{}/weights", self.base_url, netuid);
        let body = serde_json::to_vec(&WeightVote::from(weights))?;
        let headers = SignedHeaders::sign(signer, &body);

        let response = headers
            .apply(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ValidatorError::Transport(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ValidatorError::Transport(format!(
                "weight submission rejected: {} - {}",
                status, text
            )));
        }

        info!(netuid, entries = weights.len(), "Weights submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_vote_preserves_uid_order() {
        let table: WeightTable = [(9, 10), (2, 30), (5, 60)].into_iter().collect();
        let vote = WeightVote::from(&table);
        assert_eq!(vote.uids, vec![2, 5, 9]);
        assert_eq!(vote.weights, vec![30, 60, 10]);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = SubnetConfig {
            endpoint: "http://gateway:8080/".into(),
            request_timeout_secs: 5,
        };
        let client = HttpRegistryClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://gateway:8080");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let config = SubnetConfig {
            endpoint: "http://127.0.0.1:1".into(),
            request_timeout_secs: 2,
        };
        let client = HttpRegistryClient::new(&config).unwrap();
        let err = client.subnet_names().await.unwrap_err();
        assert!(matches!(err, ValidatorError::Transport(_)));
    }
}
