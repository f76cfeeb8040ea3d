//! Registry abstraction
//!
//! The registry is the ledger-side source of truth for who is in the subnet and the
//! sink for weight votes. The validator only needs these four calls.

use async_trait::async_trait;
use compass_core::{Hotkey, Keypair, Result, ValidatorError, WeightTable, WorkerId};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[async_trait]
pub trait SubnetRegistry: Send + Sync {
    /// All subnets by netuid
    async fn subnet_names(&self) -> Result<BTreeMap<u16, String>>;

    /// Raw registered address strings per uid
    async fn list_worker_addresses(&self, netuid: u16) -> Result<BTreeMap<WorkerId, String>>;

    /// Registered hotkeys per uid
    async fn list_worker_keys(&self, netuid: u16) -> Result<BTreeMap<WorkerId, Hotkey>>;

    /// Submit one weight vote for the subnet
    async fn submit_weights(&self, netuid: u16, signer: &Keypair, weights: &WeightTable)
        -> Result<()>;
}

/// Look up the netuid of a subnet by name
pub async fn resolve_subnet_id(registry: &dyn SubnetRegistry, subnet_name: &str) -> Result<u16> {
    let subnets = registry.subnet_names().await?;
    debug!("Registry lists {} subnets", subnets.len());

    let netuid = subnets
        .into_iter()
        .find(|(_, name)| name == subnet_name)
        .map(|(netuid, _)| netuid)
        .ok_or_else(|| ValidatorError::Configuration(format!("Subnet {} not found", subnet_name)))?;

    info!(subnet = %subnet_name, netuid, "Resolved subnet");
    Ok(netuid)
}
