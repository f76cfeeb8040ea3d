//! Protocol defaults for the market-compass subnet
//!
//! Everything here can be overridden through configuration.

/// Subnet the validator serves unless configured otherwise
pub const DEFAULT_SUBNET_NAME: &str = "market-compass";

/// Registry gateway used when none is configured
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:9944";

/// Request timeout for the registry gateway and the task backend
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Seconds between the starts of two validation iterations
pub const DEFAULT_ITERATION_INTERVAL_SECS: u64 = 60;

/// Maximum number of uids in one weight submission
pub const DEFAULT_MAX_ALLOWED_WEIGHTS: usize = 400;

/// Integer budget the normalized weights are scaled to
pub const DEFAULT_WEIGHT_BUDGET: u16 = 10_000;

/// Budget used by earlier validator deployments
pub const LEGACY_WEIGHT_BUDGET: u16 = 100;

/// Per-call timeout for worker RPCs
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// RPC method every worker exposes
pub const GENERATE_METHOD: &str = "generate";

/// Concurrent worker calls when the backend scores responses
pub const DELEGATED_POOL_SIZE: usize = 8;

/// Concurrent worker calls for the self-checking validator
pub const DIRECT_CHECK_POOL_SIZE: usize = 80;

/// Score given to workers that failed verification
pub const PENALTY_SCORE: f64 = 0.05;

/// Score given when a response passes (or is not checked)
pub const FULL_SCORE: f64 = 1.0;
