//! Worker RPC transport
//!
//! Workers are modules that expose `POST /method/{name}` and expect a signed
//! `{"params": {...}}` envelope addressed to their own key.

use crate::auth::SignedHeaders;
use async_trait::async_trait;
use compass_core::{Keypair, Result, ValidatorError, WorkerEndpoint, WorkerResponse};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Call `method` on the worker and return its decoded answer
    async fn invoke(
        &self,
        endpoint: &WorkerEndpoint,
        signer: &Keypair,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<WorkerResponse>;
}

/// Build the request envelope for a worker call
pub fn module_request_body(endpoint: &WorkerEndpoint, params: Value) -> Result<Value> {
    let mut params = match params {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(ValidatorError::InvalidResponse(format!(
                "module params must be an object, got {}",
                other
            )))
        }
    };
    params.insert("target_key".to_string(), json!(endpoint.hotkey.to_ss58()));
    Ok(json!({ "params": params }))
}

/// HTTP module client
#[derive(Clone, Default)]
pub struct ModuleClient {
    client: reqwest::Client,
}

impl ModuleClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WorkerTransport for ModuleClient {
    async fn invoke(
        &self,
        endpoint: &WorkerEndpoint,
        signer: &Keypair,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<WorkerResponse> {
        let url = format!("http://{}/method/{}", endpoint.address, method);
        let body = serde_json::to_vec(&module_request_body(endpoint, params)?)?;
        let headers = SignedHeaders::sign(signer, &body);

        debug!(address = %endpoint.address, method, "Calling worker");

        let response = headers
            .apply(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| ValidatorError::Transport(format!("{}: {}", endpoint.address, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ValidatorError::Transport(format!(
                "{} returned {}: {}",
                endpoint.address, status, text
            )));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| ValidatorError::InvalidResponse(format!("{}: {}", endpoint.address, e)))?;

        Ok(WorkerResponse::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_core::Hotkey;

    fn endpoint() -> WorkerEndpoint {
        WorkerEndpoint::new("10.0.0.1:8000", Hotkey([4u8; 32]))
    }

    #[test]
    fn test_request_body_wraps_params_and_targets_worker() {
        let body = module_request_body(&endpoint(), json!({"prompt": "rust"})).unwrap();
        assert_eq!(body["params"]["prompt"], "rust");
        assert_eq!(
            body["params"]["target_key"],
            json!(Hotkey([4u8; 32]).to_ss58())
        );
    }

    #[test]
    fn test_request_body_rejects_non_object_params() {
        assert!(module_request_body(&endpoint(), json!(["a"])).is_err());
        assert!(module_request_body(&endpoint(), Value::Null).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_transport_error() {
        let client = ModuleClient::new();
        let endpoint = WorkerEndpoint::new("127.0.0.1:1", Hotkey([1u8; 32]));
        let err = client
            .invoke(
                &endpoint,
                &Keypair::generate(),
                "generate",
                json!({"prompt": "x"}),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ValidatorError::Transport(_)));
    }
}
