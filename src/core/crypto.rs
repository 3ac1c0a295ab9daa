// src/core/crypto.rs

//! The black-box `{Encrypt, Decrypt, Hash}` collaborator for API key plaintext.
//! The wire format and algorithm choice are an implementation detail behind
//! the `CryptoBox` trait; callers only ever see ciphertext bytes and hex hashes.

use crate::core::errors::AppError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub trait CryptoBox: Send + Sync {
    /// Encrypts plaintext into a self-describing ciphertext blob (nonce
    /// prefix + AEAD tag).
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, AppError>;

    /// Decrypts a blob produced by `encrypt`. Any tampering or wrong key
    /// produces an `AppError::Internal` — treated by callers as a
    /// "decryption failure", counted as ignored during export/copy.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, AppError>;

    /// A deterministic digest used for dedup/lookup without
    /// needing to decrypt. Must be stable across processes given the same
    /// plaintext, so it cannot incorporate a random salt.
    fn hash(&self, plaintext: &str) -> String;
}

const NONCE_LEN: usize = 12;

/// Derives the HMAC key for `key_hash` from the AEAD key rather than reusing
/// it directly: a keyed hash, not a bare `SHA256(plaintext)`, so a leaked
/// `key_hash` column can't be dictionary-attacked offline against
/// low-entropy key prefixes like `sk-`.
fn derive_hash_key(aead_key: &[u8; 32]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(aead_key).expect("HMAC accepts any key length");
    mac.update(b"keygate:key_hash:v1");
    mac.finalize().into_bytes().into()
}

/// AES-256-GCM-backed implementation. The 32-byte key is provided out of
/// band (an environment variable or secret store — outside this crate's
/// scope, same as encryption primitives generally).
pub struct AesGcmCryptoBox {
    cipher: Aes256Gcm,
    hash_key: [u8; 32],
}

impl AesGcmCryptoBox {
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
            hash_key: derive_hash_key(key_bytes),
        }
    }
}

impl CryptoBox for AesGcmCryptoBox {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, AppError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::internal("encryption failed"))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.append(&mut ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, AppError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(AppError::internal("ciphertext too short"));
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(nonce_bytes.into(), body)
            .map_err(|_| AppError::internal("decryption failed"))?;
        String::from_utf8(plaintext).map_err(|_| AppError::internal("decrypted payload is not valid utf-8"))
    }

    fn hash(&self, plaintext: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.hash_key).expect("HMAC accepts any key length");
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_box() -> AesGcmCryptoBox {
        AesGcmCryptoBox::new(&[7u8; 32])
    }

    #[test]
    fn round_trips_plaintext() {
        let cb = test_box();
        let ct = cb.encrypt("sk-super-secret").unwrap();
        assert_eq!(cb.decrypt(&ct).unwrap(), "sk-super-secret");
    }

    #[test]
    fn hash_is_deterministic_and_key_independent_of_nonce() {
        let cb = test_box();
        let h1 = cb.hash("sk-super-secret");
        let h2 = cb.hash("sk-super-secret");
        assert_eq!(h1, h2);
        assert_ne!(h1, cb.hash("sk-other-secret"));
    }

    #[test]
    fn hash_is_keyed_not_a_bare_digest() {
        let a = AesGcmCryptoBox::new(&[7u8; 32]);
        let b = AesGcmCryptoBox::new(&[8u8; 32]);
        assert_ne!(a.hash("sk-super-secret"), b.hash("sk-super-secret"));
    }

    #[test]
    fn decrypt_rejects_corrupted_ciphertext() {
        let cb = test_box();
        let mut ct = cb.encrypt("sk-super-secret").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(cb.decrypt(&ct).is_err());
    }
}
