// src/core/importexport/reencrypt.rs

//! Shared decrypt→rehash→re-encrypt step used by both plain import and
//! copy-group: an exported/source key only carries ciphertext,
//! so recovering its dedup hash and inserting it into a (possibly
//! differently-keyed) target requires a full round trip through the crypto
//! collaborator. A decryption failure skips that one key and is counted as
//! ignored rather than aborting the batch.

use super::envelope::KeyExport;
use crate::core::bulk::NewApiKey;
use crate::core::crypto::CryptoBox;
use std::collections::HashSet;

/// Decrypts and re-encrypts each of `exported` against `group_id`, skipping
/// ciphertexts that fail to decrypt and ciphertexts whose plaintext hash is
/// already present in `existing_hashes` (which is mutated in place so a
/// later key in the same batch dedupes against an earlier one too). Keys
/// are always normalized to active/failure_count=0 by construction —
/// `NewApiKey` carries no status field.
pub fn reencrypt_and_dedup(
    crypto: &dyn CryptoBox,
    group_id: i64,
    existing_hashes: &mut HashSet<String>,
    exported: &[KeyExport],
) -> (Vec<NewApiKey>, u64) {
    let mut fresh = Vec::new();
    let mut ignored = 0u64;
    for key in exported {
        let Ok(plaintext) = crypto.decrypt(&key.key_value) else {
            ignored += 1;
            continue;
        };
        let hash = crypto.hash(&plaintext);
        if !existing_hashes.insert(hash.clone()) {
            ignored += 1;
            continue;
        }
        let Ok(ciphertext) = crypto.encrypt(&plaintext) else {
            ignored += 1;
            existing_hashes.remove(&hash);
            continue;
        };
        fresh.push(NewApiKey {
            group_id,
            key_value: ciphertext,
            key_hash: hash,
        });
    }
    (fresh, ignored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::AesGcmCryptoBox;

    #[test]
    fn corrupted_ciphertext_is_skipped_and_counted_as_ignored() {
        let cb = AesGcmCryptoBox::new(&[3u8; 32]);
        let good = KeyExport { key_value: cb.encrypt("sk-a").unwrap(), status: "active".into() };
        let mut bad_bytes = cb.encrypt("sk-b").unwrap();
        let last = bad_bytes.len() - 1;
        bad_bytes[last] ^= 0xFF;
        let bad = KeyExport { key_value: bad_bytes, status: "active".into() };

        let mut existing = HashSet::new();
        let (fresh, ignored) = reencrypt_and_dedup(&cb, 1, &mut existing, &[good, bad]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(ignored, 1);
    }

    #[test]
    fn duplicate_plaintext_hash_is_deduped_within_a_batch() {
        let cb = AesGcmCryptoBox::new(&[3u8; 32]);
        let a = KeyExport { key_value: cb.encrypt("sk-dup").unwrap(), status: "active".into() };
        let b = KeyExport { key_value: cb.encrypt("sk-dup").unwrap(), status: "invalid".into() };

        let mut existing = HashSet::new();
        let (fresh, ignored) = reencrypt_and_dedup(&cb, 1, &mut existing, &[a, b]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(ignored, 1);
    }
}
