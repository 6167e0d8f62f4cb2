// src/messaging/codec.rs
//! Shared crypto codec
//!
//! AES-256-GCM with a fresh random nonce per message. Ciphertext travels as
//! `base64(nonce || sealed)` so it fits in the string payload of an envelope.
//! The codec holds nothing mutable beyond its fixed key, so one instance is
//! shared by every runtime behind an `Arc` without locking.

use crate::utils::errors::{EngineError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// Largest plaintext accepted by [`CryptoCodec::encrypt`]
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Length of identifiers derived with [`CryptoCodec::short_id`]
pub const SHORT_ID_LEN: usize = 12;

/// Base64 ciphertext produced by a [`CryptoCodec`]
///
/// Only the codec constructs values of this type, which is what lets an
/// encrypted envelope guarantee it never carries plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(String);

impl Ciphertext {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stateless encrypt/decrypt/hash primitive
#[derive(Clone)]
pub struct CryptoCodec {
    cipher: Aes256Gcm,
    key: [u8; KEY_LEN],
}

impl CryptoCodec {
    /// Create a codec with a freshly generated random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self::with_key(key)
    }

    /// Create a codec from raw key bytes (must be 32 bytes)
    pub fn from_key(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            EngineError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, key.len()))
        })?;
        Ok(Self::with_key(key))
    }

    /// Create a codec from a base64-encoded key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| EngineError::InvalidKey(format!("invalid base64: {}", e)))?;
        Self::from_key(&key)
    }

    fn with_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            key,
        }
    }

    /// Base64 form of the key, suitable for `security.encryption_key`
    pub fn export_key(&self) -> String {
        STANDARD.encode(self.key)
    }

    /// Encrypt a plaintext string
    pub fn encrypt(&self, plaintext: &str) -> Result<Ciphertext> {
        if plaintext.len() > MAX_PAYLOAD_BYTES {
            return Err(EngineError::PayloadTooLarge {
                size: plaintext.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| EngineError::Encryption(e.to_string()))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&sealed);

        Ok(Ciphertext(STANDARD.encode(framed)))
    }

    /// Decrypt ciphertext produced by a codec sharing this key
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let framed = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| EngineError::Decryption(format!("invalid base64: {}", e)))?;

        if framed.len() < NONCE_LEN + TAG_LEN {
            return Err(EngineError::Decryption(format!(
                "ciphertext too short ({} bytes)",
                framed.len()
            )));
        }

        let (nonce, sealed) = framed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                EngineError::Decryption("authentication failed (wrong key or tampered data)".into())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| EngineError::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }

    /// SHA-256 digest as 64 lowercase hex characters
    pub fn hash(&self, data: impl AsRef<[u8]>) -> String {
        hex::encode(Sha256::digest(data.as_ref()))
    }

    /// First 12 hex characters of [`hash`](Self::hash), used for identifiers
    pub fn short_id(&self, data: impl AsRef<[u8]>) -> String {
        let mut digest = self.hash(data);
        digest.truncate(SHORT_ID_LEN);
        digest
    }
}

impl fmt::Debug for CryptoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoCodec")
            .field("cipher", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_encrypt_decrypt() {
        let codec = CryptoCodec::generate();
        let secret = "Top secret marketing data";

        let ciphertext = codec.encrypt(secret).unwrap();
        assert_ne!(ciphertext.as_str(), secret);
        assert_eq!(codec.decrypt(ciphertext.as_str()).unwrap(), secret);
    }

    #[test]
    fn test_roundtrip_edge_payloads() {
        let codec = CryptoCodec::generate();
        let largest = "x".repeat(MAX_PAYLOAD_BYTES);

        for payload in ["", "ping", "ünïcødé ✓", largest.as_str()] {
            let ciphertext = codec.encrypt(payload).unwrap();
            assert_eq!(codec.decrypt(ciphertext.as_str()).unwrap(), payload);
        }
    }

    #[test]
    fn test_nonce_is_fresh() {
        let codec = CryptoCodec::generate();
        let a = codec.encrypt("same").unwrap();
        let b = codec.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_too_large() {
        let codec = CryptoCodec::generate();
        let oversized = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        let result = codec.encrypt(&oversized);
        assert!(matches!(result, Err(EngineError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_decrypt_failure() {
        let codec = CryptoCodec::generate();

        let garbage = codec.decrypt("invalid_encrypted_data");
        assert!(matches!(garbage, Err(EngineError::Decryption(_))));

        let short = codec.decrypt(&STANDARD.encode([0u8; 8]));
        assert!(matches!(short, Err(EngineError::Decryption(_))));
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let alice = CryptoCodec::generate();
        let mallory = CryptoCodec::generate();

        let ciphertext = alice.encrypt("for alice only").unwrap();
        let result = mallory.decrypt(ciphertext.as_str());
        assert!(matches!(result, Err(EngineError::Decryption(_))));
    }

    #[test]
    fn test_key_export_import() {
        let codec = CryptoCodec::generate();
        let restored = CryptoCodec::from_base64(&codec.export_key()).unwrap();

        let ciphertext = codec.encrypt("shared key").unwrap();
        assert_eq!(restored.decrypt(ciphertext.as_str()).unwrap(), "shared key");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            CryptoCodec::from_key(&[0u8; 16]),
            Err(EngineError::InvalidKey(_))
        ));
        assert!(matches!(
            CryptoCodec::from_base64("not base64!"),
            Err(EngineError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_hash() {
        let codec = CryptoCodec::generate();
        let digest = codec.hash("secure_data_123");

        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hex::encode(Sha256::digest(b"secure_data_123")));
        assert_eq!(digest, codec.hash("secure_data_123"));
        assert_eq!(codec.short_id("secure_data_123"), digest[..SHORT_ID_LEN]);
    }

    #[test]
    fn test_concurrent_use() {
        let codec = Arc::new(CryptoCodec::generate());
        let mut handles = vec![];

        for i in 0..8 {
            let c = Arc::clone(&codec);
            handles.push(thread::spawn(move || {
                for j in 0..50 {
                    let message = format!("msg_{}_{}", i, j);
                    let ciphertext = c.encrypt(&message).unwrap();
                    assert_eq!(c.decrypt(ciphertext.as_str()).unwrap(), message);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let codec = CryptoCodec::generate();
        let rendered = format!("{:?}", codec);
        assert!(!rendered.contains(&codec.export_key()));
    }
}
