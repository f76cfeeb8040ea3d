//! Validator signing key (sr25519, Substrate compatible)
//!
//! The validator's hotkey must appear in the subnet's key map; its SS58 address is
//! what the registration check compares against. Worker RPCs and weight submissions
//! are signed with the same key.

use crate::{Hotkey, Result, ValidatorError};
use sp_core::{sr25519, Pair};

/// Value sent in the `X-Crypto` header for sr25519 signatures
pub const SR25519_CRYPTO_TYPE: u8 = 1;

/// Keypair for signing using sr25519
#[derive(Clone)]
pub struct Keypair {
    pair: sr25519::Pair,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self {
            pair: sr25519::Pair::from_seed(&seed),
        }
    }

    /// Create from BIP39 mnemonic phrase (12/24 words)
    pub fn from_mnemonic(mnemonic: &str) -> Result<Self> {
        let (pair, _) = sr25519::Pair::from_phrase(mnemonic, None)
            .map_err(|e| ValidatorError::Crypto(format!("Invalid mnemonic: {:?}", e)))?;
        Ok(Self { pair })
    }

    /// Create from seed bytes (32 bytes mini secret)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            pair: sr25519::Pair::from_seed(seed),
        }
    }

    /// Parse a secret given either as 32-byte hex (optionally `0x` prefixed) or as a mnemonic
    pub fn from_secret(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let hex = secret.strip_prefix("0x").unwrap_or(secret);

        if hex.len() == 64 {
            if let Ok(bytes) = hex::decode(hex) {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                return Ok(Self::from_seed(&seed));
            }
        }
        Self::from_mnemonic(secret)
    }

    pub fn hotkey(&self) -> Hotkey {
        Hotkey(self.pair.public().0)
    }

    /// SS58 address (5GziQCc... form)
    pub fn ss58_address(&self) -> String {
        self.hotkey().to_ss58()
    }

    /// Sign raw bytes, returning the 64 byte signature
    pub fn sign_bytes(&self, data: &[u8]) -> Vec<u8> {
        self.pair.sign(data).0.to_vec()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", self.ss58_address())
    }
}

/// Verify an sr25519 signature produced by [`Keypair::sign_bytes`]
pub fn verify_signature(signer: &Hotkey, message: &[u8], signature: &[u8]) -> Result<bool> {
    if signature.len() != 64 {
        return Err(ValidatorError::Crypto(
            "Invalid signature length (expected 64 bytes)".into(),
        ));
    }

    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(signature);
    let signature = sr25519::Signature::from_raw(sig_bytes);
    let public = sr25519::Public::from_raw(signer.0);

    Ok(sr25519::Pair::verify(&signature, message, &public))
}
