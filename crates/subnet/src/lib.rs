//! Subnet integration
//!
//! Registry access (worker discovery, subnet lookup, weight votes) and the worker
//! RPC transport used by the validator.

pub mod auth;
pub mod client;
pub mod config;
pub mod mock;
pub mod module_client;
pub mod registry;

pub use auth::SignedHeaders;
pub use client::{HttpRegistryClient, WeightVote};
pub use config::SubnetConfig;
pub use module_client::{module_request_body, ModuleClient, WorkerTransport};
pub use registry::{resolve_subnet_id, SubnetRegistry};
