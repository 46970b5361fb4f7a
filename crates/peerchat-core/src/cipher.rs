//! Payload encryption keyed by a shared secret
//!
//! The session layer only depends on the [`Cipher`] trait. [`PassphraseCipher`]
//! is the default implementation: the secret is stretched to an AES-256 key
//! with SHA-256 and every payload gets a fresh random nonce.

use core::fmt;

use aes_gcm::{AeadInPlace, Aes256Gcm, KeyInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::errors::CipherError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

// ----------------------------------------------------------------------------
// Cipher Trait
// ----------------------------------------------------------------------------

/// Symmetric cipher used for envelope payloads
///
/// Ciphertext is carried as text so it can be embedded in the JSON envelope.
pub trait Cipher: Send + Sync + fmt::Debug {
    fn encrypt(&self, plaintext: &[u8], secret: &str) -> Result<String, CipherError>;

    /// Fails with `DecryptionFailed` on a wrong secret or tampered input and
    /// with `InvalidEncoding` when the text is not ciphertext at all
    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<Vec<u8>, CipherError>;
}

// ----------------------------------------------------------------------------
// Passphrase Cipher
// ----------------------------------------------------------------------------

/// AES-256-GCM with a SHA-256 derived key
///
/// Wire format: base64(nonce (12 bytes) + tag (16 bytes) + ciphertext)
#[derive(Debug, Clone, Copy, Default)]
pub struct PassphraseCipher;

impl PassphraseCipher {
    pub fn new() -> Self {
        Self
    }

    fn derive_key(secret: &str) -> [u8; 32] {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        key
    }
}

impl Cipher for PassphraseCipher {
    fn encrypt(&self, plaintext: &[u8], secret: &str) -> Result<String, CipherError> {
        let key = Self::derive_key(secret);
        let cipher = Aes256Gcm::new((&key).into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let mut ciphertext = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached((&nonce_bytes).into(), b"", &mut ciphertext)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&tag[..]);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<Vec<u8>, CipherError> {
        let sealed = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CipherError::InvalidEncoding {
                reason: e.to_string(),
            })?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::InvalidEncoding {
                reason: format!("{} bytes is shorter than nonce and tag", sealed.len()),
            });
        }

        let key = Self::derive_key(secret);
        let cipher = Aes256Gcm::new((&key).into());

        let (nonce, rest) = sealed.split_at(NONCE_LEN);
        let (tag, body) = rest.split_at(TAG_LEN);
        let mut plaintext = body.to_vec();

        cipher
            .decrypt_in_place_detached(nonce.into(), b"", &mut plaintext, tag.into())
            .map_err(|_| CipherError::DecryptionFailed)?;

        Ok(plaintext)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = PassphraseCipher::new();
        let sealed = cipher.encrypt(b"hello", "hunter2").unwrap();
        assert_eq!(cipher.decrypt(&sealed, "hunter2").unwrap(), b"hello");
    }

    #[test]
    fn test_fresh_nonce_per_message() {
        let cipher = PassphraseCipher::new();
        let a = cipher.encrypt(b"same", "k").unwrap();
        let b = cipher.encrypt(b"same", "k").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let cipher = PassphraseCipher::new();
        let sealed = cipher.encrypt(b"hello", "hunter2").unwrap();
        assert_eq!(
            cipher.decrypt(&sealed, "other"),
            Err(CipherError::DecryptionFailed)
        );
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let cipher = PassphraseCipher::new();
        let sealed = cipher.encrypt(b"hello world", "k").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        assert_eq!(
            cipher.decrypt(&tampered, "k"),
            Err(CipherError::DecryptionFailed)
        );
    }

    #[test]
    fn test_garbage_input() {
        let cipher = PassphraseCipher::new();
        assert!(matches!(
            cipher.decrypt("not base64!!", "k"),
            Err(CipherError::InvalidEncoding { .. })
        ));
        assert!(matches!(
            cipher.decrypt(&STANDARD.encode([0u8; 8]), "k"),
            Err(CipherError::InvalidEncoding { .. })
        ));
    }
}
