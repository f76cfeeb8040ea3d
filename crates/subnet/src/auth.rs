//! Request signing shared by the module client and the registry client

use compass_core::{Keypair, SR25519_CRYPTO_TYPE};

pub const HEADER_KEY: &str = "X-Key";
pub const HEADER_SIGNATURE: &str = "X-Signature";
pub const HEADER_CRYPTO: &str = "X-Crypto";
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";

/// Authentication headers for one signed request body
#[derive(Clone, Debug)]
pub struct SignedHeaders {
    pub key: String,
    pub signature: String,
    pub timestamp: String,
}

impl SignedHeaders {
    /// Sign `body || timestamp` with the validator key
    pub fn sign(signer: &Keypair, body: &[u8]) -> Self {
        let timestamp = chrono::Utc::now().to_rfc3339();
        Self::sign_at(signer, body, timestamp)
    }

    pub fn sign_at(signer: &Keypair, body: &[u8], timestamp: String) -> Self {
        let mut message = Vec::with_capacity(body.len() + timestamp.len());
        message.extend_from_slice(body);
        message.extend_from_slice(timestamp.as_bytes());

        Self {
            key: signer.hotkey().to_hex(),
            signature: hex::encode(signer.sign_bytes(&message)),
            timestamp,
        }
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(HEADER_KEY, &self.key)
            .header(HEADER_SIGNATURE, &self.signature)
            .header(HEADER_CRYPTO, SR25519_CRYPTO_TYPE.to_string())
            .header(HEADER_TIMESTAMP, &self.timestamp)
    }
}
