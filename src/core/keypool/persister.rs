// src/core/keypool/persister.rs

//! Background batched flush of in-memory failure-count/status updates to
//! the database.

use super::repo;
use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::model::KeyStatus;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

const FLUSH_INTERVAL: Duration = Duration::from_millis(500);
const FLUSH_BATCH_CAP: usize = 500;

pub struct PendingUpdate {
    pub key_id: i64,
    pub failure_count: u32,
    pub status: KeyStatus,
}

/// Spawns the coalescing flush loop. Updates that arrive for the same key
/// between flushes are naturally coalesced since only the latest state per
/// key is retained before a flush fires.
pub fn spawn(
    pool: DbPool,
    dialect: Dialect,
    mut rx: mpsc::UnboundedReceiver<PendingUpdate>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut pending: std::collections::HashMap<i64, (u32, KeyStatus)> = std::collections::HashMap::new();
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    flush(&pool, dialect, &mut pending).await;
                    return;
                }
                _ = ticker.tick() => {
                    flush(&pool, dialect, &mut pending).await;
                }
                update = rx.recv() => {
                    match update {
                        Some(u) => {
                            pending.insert(u.key_id, (u.failure_count, u.status));
                            if pending.len() >= FLUSH_BATCH_CAP {
                                flush(&pool, dialect, &mut pending).await;
                            }
                        }
                        None => {
                            flush(&pool, dialect, &mut pending).await;
                            return;
                        }
                    }
                }
            }
        }
    });
}

async fn flush(pool: &DbPool, dialect: Dialect, pending: &mut std::collections::HashMap<i64, (u32, KeyStatus)>) {
    if pending.is_empty() {
        return;
    }
    let updates: Vec<(i64, u32, KeyStatus)> = pending.drain().map(|(id, (fc, st))| (id, fc, st)).collect();
    let count = updates.len();
    match repo::flush_key_states(pool, dialect, &updates).await {
        Ok(()) => {}
        Err(e) if e.is_transient() => {
            warn!("key state flush of {count} rows hit a transient error, will retry next tick: {e}");
            for (id, fc, st) in updates {
                pending.entry(id).or_insert((fc, st));
            }
        }
        Err(e) => {
            error!("key state flush of {count} rows failed: {e}");
        }
    }
}
