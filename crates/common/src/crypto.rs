//! WireGuard key material
//!
//! X25519 key pairs for the tunnel handshake, base64 encoded the way
//! WireGuard config files expect them.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// Length of a raw X25519 key
pub const KEY_LEN: usize = 32;

/// WireGuard key pair, both halves base64 encoded
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    /// Generate a fresh key pair from the operating system RNG
    pub fn generate() -> Result<Self> {
        Self::generate_from(&mut OsRng)
    }

    /// Generate a key pair from the given randomness source
    pub fn generate_from<R: RngCore>(rng: &mut R) -> Result<Self> {
        let mut private_key_bytes = [0u8; KEY_LEN];
        rng.try_fill_bytes(&mut private_key_bytes)
            .map_err(|e| Error::Crypto(format!("randomness source unavailable: {}", e)))?;

        // WireGuard key clamping
        private_key_bytes[0] &= 248;
        private_key_bytes[31] &= 127;
        private_key_bytes[31] |= 64;

        let secret = StaticSecret::from(private_key_bytes);
        let public = PublicKey::from(&secret);

        Ok(Self {
            private_key: STANDARD.encode(private_key_bytes),
            public_key: STANDARD.encode(public.as_bytes()),
        })
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Derive the base64 public key for a base64 private key
pub fn public_key_from_private(private_key: &str) -> Result<String> {
    let bytes = decode_key(private_key)?;
    let secret = StaticSecret::from(bytes);
    Ok(STANDARD.encode(PublicKey::from(&secret).as_bytes()))
}

/// Check that a string is a base64-encoded 32-byte key
pub fn is_valid_wireguard_key(key: &str) -> bool {
    decode_key(key).is_ok()
}

fn decode_key(key: &str) -> Result<[u8; KEY_LEN]> {
    let decoded = STANDARD
        .decode(key.trim())
        .map_err(|e| Error::Crypto(format!("invalid base64 key: {}", e)))?;
    decoded.try_into().map_err(|v: Vec<u8>| {
        Error::Crypto(format!(
            "Invalid key length: expected {} bytes, got {}",
            KEY_LEN,
            v.len()
        ))
    })
}
