//! Mock implementations for registry and worker tests
//!
//! Simulate a subnet (workers, keys, votes) and worker behaviour (answers,
//! failures, latency) without touching the network.

use crate::{SubnetRegistry, WorkerTransport};
use async_trait::async_trait;
use compass_core::{
    Hotkey, Keypair, Result, ValidatorError, WeightTable, WorkerEndpoint, WorkerId, WorkerResponse,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Deterministic hotkey for a test uid
pub fn hotkey_from_seed(seed: u64) -> Hotkey {
    let mut hotkey = [0u8; 32];
    hotkey[0..8].copy_from_slice(&seed.to_le_bytes());
    hotkey[31] = 0xC0;
    Hotkey(hotkey)
}

/// A weight vote captured by [`MockRegistry`]
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSubmission {
    pub netuid: u16,
    pub signer: Hotkey,
    pub weights: WeightTable,
}

/// In-memory registry
#[derive(Default)]
pub struct MockRegistry {
    subnets: BTreeMap<u16, String>,
    addresses: BTreeMap<WorkerId, String>,
    keys: BTreeMap<WorkerId, Hotkey>,
    fail_addresses: bool,
    fail_keys: bool,
    fail_submit: bool,
    address_queries: AtomicUsize,
    submissions: Mutex<Vec<RecordedSubmission>>,
}

impl MockRegistry {
    pub fn builder() -> MockRegistryBuilder {
        MockRegistryBuilder::default()
    }

    /// Number of `submit_weights` calls, including rejected ones
    pub fn submit_calls(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().clone()
    }

    pub fn last_submission(&self) -> Option<RecordedSubmission> {
        self.submissions.lock().last().cloned()
    }

    pub fn address_queries(&self) -> usize {
        self.address_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubnetRegistry for MockRegistry {
    async fn subnet_names(&self) -> Result<BTreeMap<u16, String>> {
        Ok(self.subnets.clone())
    }

    async fn list_worker_addresses(&self, _netuid: u16) -> Result<BTreeMap<WorkerId, String>> {
        self.address_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_addresses {
            return Err(ValidatorError::Transport("registry unreachable".into()));
        }
        Ok(self.addresses.clone())
    }

    async fn list_worker_keys(&self, _netuid: u16) -> Result<BTreeMap<WorkerId, Hotkey>> {
        if self.fail_keys {
            return Err(ValidatorError::Transport("registry unreachable".into()));
        }
        Ok(self.keys.clone())
    }

    async fn submit_weights(
        &self,
        netuid: u16,
        signer: &Keypair,
        weights: &WeightTable,
    ) -> Result<()> {
        self.submissions.lock().push(RecordedSubmission {
            netuid,
            signer: signer.hotkey(),
            weights: weights.clone(),
        });
        if self.fail_submit {
            return Err(ValidatorError::Transport("extrinsic rejected".into()));
        }
        Ok(())
    }
}

/// Builder for [`MockRegistry`]
#[derive(Default)]
pub struct MockRegistryBuilder {
    registry: MockRegistry,
}

impl MockRegistryBuilder {
    pub fn subnet(mut self, netuid: u16, name: &str) -> Self {
        self.registry.subnets.insert(netuid, name.to_string());
        self
    }

    /// Register a worker with a raw address string and hotkey
    pub fn worker(mut self, uid: WorkerId, address: &str, hotkey: Hotkey) -> Self {
        self.registry.addresses.insert(uid, address.to_string());
        self.registry.keys.insert(uid, hotkey);
        self
    }

    /// Register a worker with a key but no address entry
    pub fn key_only(mut self, uid: WorkerId, hotkey: Hotkey) -> Self {
        self.registry.keys.insert(uid, hotkey);
        self
    }

    /// Register the validator itself so the registration check passes
    pub fn validator(self, uid: WorkerId, keypair: &Keypair) -> Self {
        self.key_only(uid, keypair.hotkey())
    }

    pub fn fail_addresses(mut self) -> Self {
        self.registry.fail_addresses = true;
        self
    }

    pub fn fail_keys(mut self) -> Self {
        self.registry.fail_keys = true;
        self
    }

    pub fn fail_submit(mut self) -> Self {
        self.registry.fail_submit = true;
        self
    }

    pub fn build(self) -> MockRegistry {
        self.registry
    }
}

/// Scripted worker behaviour
#[derive(Clone, Debug)]
pub enum MockReply {
    Answer(Value),
    Fail(String),
    /// Sleep, then answer
    Delayed(Duration, Value),
    /// Never answers within any sane timeout
    Hang,
}

/// In-memory worker transport keyed by worker address
#[derive(Default)]
pub struct MockTransport {
    replies: HashMap<String, MockReply>,
    calls: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, address: &str, reply: MockReply) -> Self {
        self.replies.insert(address.to_string(), reply);
        self
    }

    pub fn answer(self, address: &str, value: Value) -> Self {
        self.reply(address, MockReply::Answer(value))
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(address, params)` of every call in arrival order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Highest number of calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkerTransport for MockTransport {
    async fn invoke(
        &self,
        endpoint: &WorkerEndpoint,
        _signer: &Keypair,
        _method: &str,
        params: Value,
        _timeout: Duration,
    ) -> Result<WorkerResponse> {
        self.calls.lock().push((endpoint.address.clone(), params));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        match self.replies.get(&endpoint.address).cloned() {
            Some(MockReply::Answer(value)) => Ok(WorkerResponse::new(value)),
            Some(MockReply::Delayed(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(WorkerResponse::new(value))
            }
            Some(MockReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(ValidatorError::Transport("hung".into()))
            }
            Some(MockReply::Fail(message)) => Err(ValidatorError::Transport(message)),
            None => Err(ValidatorError::Transport(format!(
                "connection refused: {}",
                endpoint.address
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hotkey_from_seed_deterministic() {
        assert_eq!(hotkey_from_seed(42), hotkey_from_seed(42));
        assert_ne!(hotkey_from_seed(42), hotkey_from_seed(43));
    }

    #[tokio::test]
    async fn test_mock_registry_records_submissions() {
        let kp = Keypair::generate();
        let registry = MockRegistry::builder().subnet(1, "s").build();
        let weights: WeightTable = [(1, 100)].into_iter().collect();

        registry.submit_weights(1, &kp, &weights).await.unwrap();

        assert_eq!(registry.submit_calls(), 1);
        let recorded = registry.last_submission().unwrap();
        assert_eq!(recorded.signer, kp.hotkey());
        assert_eq!(recorded.weights, weights);
    }

    #[tokio::test]
    async fn test_mock_registry_failures() {
        let registry = MockRegistry::builder()
            .fail_addresses()
            .fail_submit()
            .build();
        assert!(registry.list_worker_addresses(1).await.is_err());
        assert!(registry
            .submit_weights(1, &Keypair::generate(), &WeightTable::new())
            .await
            .is_err());
        assert_eq!(registry.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_transport_scripted_replies() {
        let transport = MockTransport::new()
            .answer("1.1.1.1:1", json!(["ok"]))
            .reply("2.2.2.2:2", MockReply::Fail("boom".into()));
        let kp = Keypair::generate();
        let timeout = Duration::from_secs(1);

        let ok = transport
            .invoke(
                &WorkerEndpoint::new("1.1.1.1:1", hotkey_from_seed(1)),
                &kp,
                "generate",
                json!({}),
                timeout,
            )
            .await
            .unwrap();
        assert_eq!(ok.0, json!(["ok"]));

        let failed = transport
            .invoke(
                &WorkerEndpoint::new("2.2.2.2:2", hotkey_from_seed(2)),
                &kp,
                "generate",
                json!({}),
                timeout,
            )
            .await;
        assert!(failed.is_err());

        let unknown = transport
            .invoke(
                &WorkerEndpoint::new("3.3.3.3:3", hotkey_from_seed(3)),
                &kp,
                "generate",
                json!({}),
                timeout,
            )
            .await;
        assert!(unknown.is_err());
        assert_eq!(transport.call_count(), 3);
    }
}
