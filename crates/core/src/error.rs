//! Error types for the validator

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Validator error types
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// Worker or registry unreachable, timed out or answered garbage
    #[error("Transport error: {0}")]
    Transport(String),

    /// Task or scoring backend unavailable
    #[error("Backend error: {0}")]
    Backend(String),

    /// Ground-truth source failed during a verification check
    #[error("Ground truth error: {0}")]
    GroundTruth(String),

    /// Validator key is not registered in the subnet
    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Division by zero: score total is zero")]
    DivisionByZero,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl ValidatorError {
    /// Fatal errors stop the validation loop; everything else costs at most one iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ValidatorError::Registration(_) | ValidatorError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for ValidatorError {
    fn from(err: serde_json::Error) -> Self {
        ValidatorError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_registration_and_configuration_are_fatal() {
        assert!(ValidatorError::Registration("missing".into()).is_fatal());
        assert!(ValidatorError::Configuration("no subnet".into()).is_fatal());

        assert!(!ValidatorError::Transport("timeout".into()).is_fatal());
        assert!(!ValidatorError::Backend("503".into()).is_fatal());
        assert!(!ValidatorError::GroundTruth("rate limited".into()).is_fatal());
        assert!(!ValidatorError::DivisionByZero.is_fatal());
    }

    #[test]
    fn test_serde_json_error_converts_to_serialization() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        let converted: ValidatorError = err.into();
        assert!(matches!(converted, ValidatorError::Serialization(_)));
    }
}
