//! Configuration types for the validation loop

use compass_core::{
    Result, ValidatorError, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_ITERATION_INTERVAL_SECS,
    DEFAULT_MAX_ALLOWED_WEIGHTS, DEFAULT_SUBNET_NAME, DEFAULT_WEIGHT_BUDGET, PENALTY_SCORE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which scoring strategy the validator runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Responses are scored by the task backend
    Delegated,
    /// Responses are spot-checked against a ground-truth source
    DirectCheck,
    /// Weights are copied from the backend's aggregated vote
    Passthrough,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Delegated => "delegated",
            StrategyKind::DirectCheck => "direct-check",
            StrategyKind::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

/// Validation loop settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Subnet whose workers are validated
    pub subnet_name: String,
    /// Target time between the starts of two iterations
    #[serde(with = "duration_secs")]
    pub iteration_interval: Duration,
    /// Highest-scored entries kept in a weight vote
    pub max_allowed_weights: usize,
    /// Integer total the weights are scaled to
    pub weight_budget: u16,
    /// Time box for a single worker call
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
    /// Pause between two per-worker scoring calls
    #[serde(with = "duration_millis")]
    pub scoring_pause: Duration,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            subnet_name: DEFAULT_SUBNET_NAME.to_string(),
            iteration_interval: Duration::from_secs(DEFAULT_ITERATION_INTERVAL_SECS),
            max_allowed_weights: DEFAULT_MAX_ALLOWED_WEIGHTS,
            weight_budget: DEFAULT_WEIGHT_BUDGET,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            scoring_pause: Duration::from_millis(500),
        }
    }
}

impl ValidatorSettings {
    /// Defaults tuned for a strategy's expected worker latency
    pub fn for_strategy(kind: StrategyKind) -> Self {
        let call_timeout = match kind {
            StrategyKind::Delegated | StrategyKind::Passthrough => Duration::from_secs(60),
            StrategyKind::DirectCheck => Duration::from_secs(3),
        };
        Self {
            call_timeout,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.subnet_name.trim().is_empty() {
            return Err(ValidatorError::Configuration(
                "subnet_name must not be empty".into(),
            ));
        }
        if self.weight_budget == 0 {
            return Err(ValidatorError::Configuration(
                "weight_budget must be positive".into(),
            ));
        }
        if self.max_allowed_weights == 0 {
            return Err(ValidatorError::Configuration(
                "max_allowed_weights must be positive".into(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ValidatorError::Configuration(
                "call_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Spot-check tuning for the direct-check strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum time between two ground-truth checks, across all workers
    #[serde(with = "duration_secs")]
    pub min_check_interval: Duration,
    /// Chance that a worker with no pending queries is checked anyway
    pub sample_rate: f64,
    /// Fraction of response items that must appear in the ground truth
    pub match_threshold: f64,
    /// Score for workers that failed a check
    pub penalty_score: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_check_interval: Duration::from_secs(10),
            sample_rate: 0.01,
            match_threshold: 0.9,
            penalty_score: PENALTY_SCORE,
        }
    }
}

impl ThrottleConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ValidatorError::Configuration(format!(
                "sample_rate out of range: {}",
                self.sample_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ValidatorError::Configuration(format!(
                "match_threshold out of range: {}",
                self.match_threshold
            )));
        }
        if !compass_core::is_valid_score(self.penalty_score) {
            return Err(ValidatorError::Configuration(format!(
                "penalty_score out of range: {}",
                self.penalty_score
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ValidatorSettings::default();
        assert_eq!(settings.subnet_name, "market-compass");
        assert_eq!(settings.iteration_interval, Duration::from_secs(60));
        assert_eq!(settings.max_allowed_weights, 400);
        assert_eq!(settings.weight_budget, 10_000);
        assert_eq!(settings.scoring_pause, Duration::from_millis(500));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_strategy_presets() {
        assert_eq!(
            ValidatorSettings::for_strategy(StrategyKind::Delegated).call_timeout,
            Duration::from_secs(60)
        );
        assert_eq!(
            ValidatorSettings::for_strategy(StrategyKind::DirectCheck).call_timeout,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_settings_serde_units() {
        let json = serde_json::to_value(ValidatorSettings::default()).unwrap();
        assert_eq!(json["iteration_interval"], 60);
        assert_eq!(json["scoring_pause"], 500);

        let parsed: ValidatorSettings = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, ValidatorSettings::default());
    }

    #[test]
    fn test_invalid_settings_are_configuration_errors() {
        let settings = ValidatorSettings {
            weight_budget: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ValidatorError::Configuration(_))
        ));

        let throttle = ThrottleConfig {
            sample_rate: 1.5,
            ..Default::default()
        };
        assert!(throttle.validate().is_err());
    }

    #[test]
    fn test_strategy_kind_display_matches_serde() {
        for kind in [
            StrategyKind::Delegated,
            StrategyKind::DirectCheck,
            StrategyKind::Passthrough,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.to_string()));
        }
    }
}
