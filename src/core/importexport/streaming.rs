// src/core/importexport/streaming.rs

//! Line-oriented streaming key import: one plaintext key per line, batched
//! by an operation-tier-derived size estimated from the stream's total byte
//! count rather than a line count known up front. Two dedup layers apply —
//! a local set for the batch currently being built, and the group's
//! existing-hash set, which is only merged with the batch's hashes *after*
//! that batch's insert succeeds, so a failed batch never marks its keys as
//! already seen for a caller that retries the same stream.

use crate::config::Dialect;
use crate::core::bulk::{bulk_insert_api_keys, calculate_optimal_batch_size, NewApiKey};
use crate::core::crypto::CryptoBox;
use crate::core::db::DbPool;
use crate::core::errors::AppResult;
use crate::core::keypool::repo as key_repo;
use std::collections::HashSet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// A single line beyond this length is rejected rather than buffered whole.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Assumed average bytes per key line, used only to turn a stream's total
/// byte count into an estimated record count for `calculate_optimal_batch_size`.
const ASSUMED_LINE_BYTES: usize = 64;
const NEW_KEY_COLUMN_COUNT: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct StreamImportOutcome {
    pub keys_inserted: u64,
    pub keys_ignored: u64,
    pub lines_rejected_too_long: u64,
}

/// Reads one line from `reader` into `buf`, never buffering more than
/// `MAX_LINE_BYTES` of it — bytes beyond the cap are consumed from the
/// underlying reader and discarded rather than appended, so an adversarial
/// line with no newline cannot grow `buf` unbounded. Returns `None` at EOF
/// with nothing left to read, otherwise `Some(overflowed)` where `overflowed`
/// is true if the line (including a final unterminated line at EOF) exceeded
/// the cap.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<bool>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut overflowed = false;
    let mut read_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        read_any = true;
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            let take = pos;
            if buf.len() + take <= MAX_LINE_BYTES {
                buf.extend_from_slice(&available[..take]);
            } else {
                overflowed = true;
                let remaining_cap = MAX_LINE_BYTES.saturating_sub(buf.len());
                buf.extend_from_slice(&available[..remaining_cap.min(take)]);
            }
            reader.consume(pos + 1);
            return Ok(Some(overflowed));
        }
        let take = available.len();
        if buf.len() + take <= MAX_LINE_BYTES {
            buf.extend_from_slice(available);
        } else {
            overflowed = true;
            let remaining_cap = MAX_LINE_BYTES.saturating_sub(buf.len());
            buf.extend_from_slice(&available[..remaining_cap]);
        }
        reader.consume(take);
    }
    if !read_any {
        return Ok(None);
    }
    Ok(Some(overflowed))
}

async fn flush_batch(
    pool: &DbPool,
    dialect: Dialect,
    batch: &mut Vec<NewApiKey>,
    batch_hashes: &mut Vec<String>,
    existing_hashes: &mut HashSet<String>,
    outcome: &mut StreamImportOutcome,
) -> AppResult<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let inserted = bulk_insert_api_keys(pool, dialect, batch).await?;
    outcome.keys_inserted += inserted;
    existing_hashes.extend(batch_hashes.drain(..));
    batch.clear();
    Ok(())
}

/// Streams plaintext keys (one per line) from `reader` into `group_id`.
/// `estimated_total_bytes` should be the caller's best estimate of the
/// stream's total size (e.g. a multipart upload's `Content-Length`) and only
/// feeds the batch-size heuristic — an inaccurate estimate affects
/// throughput, never correctness.
pub async fn import_keys_stream<R>(
    pool: &DbPool,
    dialect: Dialect,
    crypto: &dyn CryptoBox,
    group_id: i64,
    mut reader: R,
    estimated_total_bytes: u64,
) -> AppResult<StreamImportOutcome>
where
    R: AsyncBufRead + Unpin,
{
    let estimated_total_records = ((estimated_total_bytes as usize) / ASSUMED_LINE_BYTES).max(1);
    let batch_size = calculate_optimal_batch_size(
        dialect,
        ASSUMED_LINE_BYTES,
        NEW_KEY_COLUMN_COUNT,
        estimated_total_records,
    ) as usize;

    let mut existing_hashes = key_repo::fetch_existing_hashes(pool, dialect, group_id).await?;
    let mut outcome = StreamImportOutcome::default();
    let mut batch: Vec<NewApiKey> = Vec::with_capacity(batch_size);
    let mut batch_hashes: Vec<String> = Vec::with_capacity(batch_size);
    let mut local_seen: HashSet<String> = HashSet::new();

    let mut line_buf: Vec<u8> = Vec::with_capacity(256);
    loop {
        let overflowed = match read_bounded_line(&mut reader, &mut line_buf).await? {
            Some(overflowed) => overflowed,
            None => break,
        };
        if overflowed {
            outcome.lines_rejected_too_long += 1;
            continue;
        }
        let line = String::from_utf8_lossy(&line_buf);
        let plaintext = line.trim();
        if plaintext.is_empty() {
            continue;
        }

        let hash = crypto.hash(plaintext);
        if existing_hashes.contains(&hash) || !local_seen.insert(hash.clone()) {
            outcome.keys_ignored += 1;
            continue;
        }
        let ciphertext = crypto.encrypt(plaintext)?;
        batch.push(NewApiKey {
            group_id,
            key_value: ciphertext,
            key_hash: hash.clone(),
        });
        batch_hashes.push(hash);

        if batch.len() >= batch_size {
            flush_batch(pool, dialect, &mut batch, &mut batch_hashes, &mut existing_hashes, &mut outcome).await?;
            local_seen.clear();
        }
    }
    flush_batch(pool, dialect, &mut batch, &mut batch_hashes, &mut existing_hashes, &mut outcome).await?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crypto::AesGcmCryptoBox;
    use std::io::Cursor;

    #[tokio::test]
    async fn blank_and_overlong_lines_are_skipped_not_inserted() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE api_keys (id INTEGER PRIMARY KEY, group_id INTEGER, key_value BLOB, \
             key_hash TEXT, status TEXT, failure_count INTEGER, last_used_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let cb = AesGcmCryptoBox::new(&[9u8; 32]);
        let overlong = "x".repeat(MAX_LINE_BYTES + 1);
        let input = format!("\n{overlong}\n");
        let cursor = Cursor::new(input.into_bytes());

        let outcome = import_keys_stream(&pool, Dialect::Sqlite, &cb, 1, cursor, 4096)
            .await
            .unwrap();
        assert_eq!(outcome.keys_inserted, 0);
        assert_eq!(outcome.lines_rejected_too_long, 1);
    }

    #[tokio::test]
    async fn valid_lines_are_deduped_and_inserted() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE api_keys (id INTEGER PRIMARY KEY, group_id INTEGER, key_value BLOB, \
             key_hash TEXT, status TEXT, failure_count INTEGER, last_used_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let cb = AesGcmCryptoBox::new(&[9u8; 32]);
        let input = "sk-one\nsk-two\nsk-one\n";
        let cursor = Cursor::new(input.as_bytes().to_vec());

        let outcome = import_keys_stream(&pool, Dialect::Sqlite, &cb, 1, cursor, 4096)
            .await
            .unwrap();
        assert_eq!(outcome.keys_inserted, 2);
        assert_eq!(outcome.keys_ignored, 1);
    }
}
