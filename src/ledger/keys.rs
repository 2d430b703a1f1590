//! Wallet Keys and Addresses
//!
//! Key pairs are ed25519. An address is the unpadded base32 encoding of the
//! public key followed by the last four bytes of its SHA-512/256 digest.
//! Private keys are exported as base64 of `seed || public key`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512_256};
use std::fmt;
use thiserror::Error;

/// Length of an encoded address
pub const ADDRESS_LENGTH: usize = 58;

const CHECKSUM_LENGTH: usize = 4;

/// Key errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Signing key pair of a custodial wallet
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: String,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = encode_address(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Restore from an exported private key (base64 of seed || public key)
    pub fn from_private_key(encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        if bytes.len() != 64 {
            return Err(KeyError::InvalidKey(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        let keys = Self::from_signing_key(SigningKey::from_bytes(&seed));

        if keys.signing_key.verifying_key().as_bytes()[..] != bytes[32..] {
            return Err(KeyError::InvalidKey(
                "public half does not match seed".to_string(),
            ));
        }

        Ok(keys)
    }

    /// Export the private key (base64 of seed || public key)
    pub fn private_key(&self) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(&self.signing_key.to_bytes());
        bytes.extend_from_slice(self.signing_key.verifying_key().as_bytes());
        STANDARD.encode(bytes)
    }

    /// Public address
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign raw bytes
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Encode a public key as an address
pub fn encode_address(public_key: &[u8; 32]) -> String {
    let digest = Sha512_256::digest(public_key);
    let mut bytes = Vec::with_capacity(32 + CHECKSUM_LENGTH);
    bytes.extend_from_slice(public_key);
    bytes.extend_from_slice(&digest[digest.len() - CHECKSUM_LENGTH..]);
    BASE32_NOPAD.encode(&bytes)
}

/// Decode an address into its public key, verifying the checksum
pub fn decode_address(address: &str) -> Result<[u8; 32], KeyError> {
    if address.len() != ADDRESS_LENGTH {
        return Err(KeyError::InvalidAddress(format!(
            "expected {} characters, got {}",
            ADDRESS_LENGTH,
            address.len()
        )));
    }

    let bytes = BASE32_NOPAD
        .decode(address.as_bytes())
        .map_err(|e| KeyError::InvalidAddress(e.to_string()))?;

    if bytes.len() != 32 + CHECKSUM_LENGTH {
        return Err(KeyError::InvalidAddress("wrong decoded length".to_string()));
    }

    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&bytes[..32]);

    if encode_address(&public_key) != address {
        return Err(KeyError::InvalidAddress("checksum mismatch".to_string()));
    }

    Ok(public_key)
}

/// Whether `address` is a well-formed address
pub fn is_valid_address(address: &str) -> bool {
    decode_address(address).is_ok()
}
