//! Validator Node
//!
//! Runs the market-compass validation loop against a registry gateway and the
//! subnet task backend. Weights are submitted every iteration.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use compass_core::{Keypair, DEFAULT_REGISTRY_URL};
use compass_subnet::{resolve_subnet_id, HttpRegistryClient, ModuleClient, SubnetConfig};
use compass_validator::{
    build_strategy, GroundTruthSource, HttpTaskBackend, StrategyKind, ThrottleConfig,
    ThrottleLedger, TwitterSearchClient, ValidationOrchestrator, ValidatorSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// ==================== CLI ====================

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Backend scores every answer
    Delegated,
    /// Spot-check answers against the search API
    DirectCheck,
    /// Copy the backend's aggregated vote
    Passthrough,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Delegated => StrategyKind::Delegated,
            StrategyArg::DirectCheck => StrategyKind::DirectCheck,
            StrategyArg::Passthrough => StrategyKind::Passthrough,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "validator-node")]
#[command(about = "Market-compass subnet validator")]
struct Args {
    /// Scoring strategy
    #[arg(long, value_enum, env = "VALIDATOR_STRATEGY", default_value = "delegated")]
    strategy: StrategyArg,

    /// Secret key (hex seed or mnemonic)
    #[arg(short = 'k', long, env = "VALIDATOR_SECRET_KEY")]
    secret_key: Option<String>,

    /// Registry gateway
    #[arg(long, env = "REGISTRY_URL", default_value = DEFAULT_REGISTRY_URL)]
    registry_url: String,

    #[arg(long, env = "SUBNET_NAME", default_value = compass_core::DEFAULT_SUBNET_NAME)]
    subnet_name: String,

    /// Task backend
    #[arg(long, env = "MC_SUBNET_API_URL")]
    subnet_api_url: String,

    #[arg(long, env = "MC_SUBNET_API_X_API_KEY")]
    subnet_api_key: Option<String>,

    /// Search API token, required for direct-check
    #[arg(long, env = "MC_BEARER_TOKEN")]
    bearer_token: Option<String>,

    /// Timeout in seconds for registry, backend and search requests
    #[arg(long, default_value_t = compass_core::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Worker call timeout in seconds (defaults to the strategy preset)
    #[arg(long)]
    call_timeout: Option<u64>,

    /// Seconds between iteration starts
    #[arg(long, default_value = "60")]
    iteration_interval: u64,

    #[arg(long, default_value = "400")]
    max_allowed_weights: usize,

    #[arg(long, default_value = "10000")]
    weight_budget: u16,

    /// Seconds between two ground-truth checks
    #[arg(long, default_value = "10")]
    check_interval: u64,

    /// Chance of checking a worker with no pending queries
    #[arg(long, default_value = "0.01")]
    sample_rate: f64,

    /// Stop after this many iterations
    #[arg(long)]
    iterations: Option<u64>,
}

impl Args {
    fn settings(&self, kind: StrategyKind) -> ValidatorSettings {
        let preset = ValidatorSettings::for_strategy(kind);
        ValidatorSettings {
            subnet_name: self.subnet_name.clone(),
            iteration_interval: Duration::from_secs(self.iteration_interval),
            max_allowed_weights: self.max_allowed_weights,
            weight_budget: self.weight_budget,
            call_timeout: self
                .call_timeout
                .map(Duration::from_secs)
                .unwrap_or(preset.call_timeout),
            ..preset
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    fn subnet_config(&self) -> SubnetConfig {
        SubnetConfig {
            endpoint: self.registry_url.clone(),
            request_timeout_secs: self.request_timeout,
        }
    }

    fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            min_check_interval: Duration::from_secs(self.check_interval),
            sample_rate: self.sample_rate,
            ..ThrottleConfig::default()
        }
    }
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,validator_node=debug".into()),
        )
        .init();

    let args = Args::parse();
    let kind = StrategyKind::from(args.strategy);
    info!("Starting validator ({} strategy)", kind);

    // Keypair
    let keypair = Arc::new(load_keypair(&args)?);
    info!("Validator: {}", keypair.ss58_address());

    let settings = args.settings(kind);
    settings.validate()?;

    // Registry
    let registry = Arc::new(HttpRegistryClient::new(&args.subnet_config())?);
    let netuid = resolve_subnet_id(registry.as_ref(), &settings.subnet_name).await?;
    info!("Subnet {} has netuid {}", settings.subnet_name, netuid);

    // Backend and strategy
    let backend = Arc::new(HttpTaskBackend::new(
        &args.subnet_api_url,
        args.subnet_api_key.clone(),
        args.request_timeout(),
    )?);
    let ground_truth: Option<Arc<dyn GroundTruthSource>> = match &args.bearer_token {
        Some(token) => Some(Arc::new(TwitterSearchClient::new(
            token.clone(),
            args.request_timeout(),
        )?)),
        None => None,
    };
    let ledger = Arc::new(ThrottleLedger::new(args.throttle()));
    let strategy = build_strategy(kind, backend, ground_truth, ledger.clone())
        .context("failed to build scoring strategy")?;

    let orchestrator = ValidationOrchestrator::new(
        settings,
        netuid,
        keypair,
        registry,
        Arc::new(ModuleClient::new()),
        strategy,
    );

    info!("Validator running. Ctrl+C to stop.");

    let run = async {
        match args.iterations {
            Some(n) => orchestrator.run_iterations(n).await,
            None => orchestrator.run().await,
        }
    };

    let result = tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    };

    let status = orchestrator.status();
    info!(
        iterations = status.iterations,
        submissions = status.submissions,
        abandoned = status.abandoned,
        blacklisted = ledger.snapshot().blacklisted().len(),
        "Stopped."
    );

    if let Err(e) = result {
        error!("Validation loop stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}

fn load_keypair(args: &Args) -> Result<Keypair> {
    let secret = args
        .secret_key
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("VALIDATOR_SECRET_KEY required"))?;
    Ok(Keypair::from_secret(secret)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_apply_strategy_preset() {
        let args = Args::parse_from([
            "validator-node",
            "--strategy",
            "direct-check",
            "--subnet-api-url",
            "http://backend",
        ]);
        let settings = args.settings(args.strategy.into());
        assert_eq!(settings.call_timeout, Duration::from_secs(3));
        assert_eq!(settings.weight_budget, 10_000);
        assert_eq!(settings.subnet_name, "market-compass");
    }

    #[test]
    fn test_explicit_timeout_overrides_preset() {
        let args = Args::parse_from([
            "validator-node",
            "--subnet-api-url",
            "http://backend",
            "--call-timeout",
            "12",
            "--weight-budget",
            "100",
        ]);
        let settings = args.settings(args.strategy.into());
        assert_eq!(settings.call_timeout, Duration::from_secs(12));
        assert_eq!(settings.weight_budget, 100);
    }

    #[test]
    fn test_missing_secret_key() {
        let mut args = Args::parse_from(["validator-node", "--subnet-api-url", "http://backend"]);
        args.secret_key = None;
        assert!(load_keypair(&args).is_err());
    }

    #[test]
    fn test_request_timeout_independent_of_call_timeout() {
        let args = Args::parse_from([
            "validator-node",
            "--strategy",
            "direct-check",
            "--subnet-api-url",
            "http://backend",
        ]);
        let settings = args.settings(args.strategy.into());
        assert_eq!(settings.call_timeout, Duration::from_secs(3));
        assert_eq!(args.request_timeout(), Duration::from_secs(30));

        let registry = args.subnet_config();
        assert_eq!(registry.endpoint, SubnetConfig::default().endpoint);
        assert_eq!(registry.request_timeout_secs, 30);
    }

    #[test]
    fn test_request_timeout_flag() {
        let args = Args::parse_from([
            "validator-node",
            "--subnet-api-url",
            "http://backend",
            "--request-timeout",
            "90",
            "--registry-url",
            "http://gateway:8080",
        ]);
        assert_eq!(args.request_timeout(), Duration::from_secs(90));
        assert_eq!(args.subnet_config().endpoint, "http://gateway:8080");
        assert_eq!(args.subnet_config().request_timeout_secs, 90);
    }
}
