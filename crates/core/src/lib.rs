//! Compass Core Types
//!
//! Shared types, errors, signing and weight math for the market-compass validator.

pub mod address;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;
pub mod weights;

pub use address::*;
pub use constants::*;
pub use crypto::*;
pub use error::*;
pub use types::*;
pub use weights::*;
