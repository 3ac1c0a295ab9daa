// src/core/group/manager.rs

//! `GroupManager`: the in-memory, cluster-synchronizable group cache and
//! its syncer.

use super::cache::GroupCache;
use super::loader;
use crate::core::db::DbPool;
use crate::core::errors::{AppError, AppResult};
use crate::core::model::Group;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The well-known pub/sub topic every node subscribes to for invalidations.
pub const GROUPS_UPDATED_CHANNEL: &str = "groups:updated";

const INITIAL_LOAD_MAX_ATTEMPTS: u32 = 3;
const INITIAL_LOAD_BASE_BACKOFF_MS: u64 = 200;
const INITIAL_LOAD_MAX_TIMEOUT_MS: u64 = 5000;

/// A callback invoked after every successful reload, used to drive
/// downstream caches (group list cache, child-group cache) off the same
/// snapshot without a second database read.
pub type ReloadCallback = Arc<dyn Fn(&[Arc<Group>]) + Send + Sync>;

pub struct GroupManager {
    pool: DbPool,
    timeout: Duration,
    cache: RwLock<Arc<GroupCache>>,
    invalidate_tx: broadcast::Sender<()>,
    callbacks: RwLock<Vec<ReloadCallback>>,
    shutdown: CancellationToken,
}

impl GroupManager {
    /// Constructs the manager and performs the initial load. On initial
    /// load, transient errors retry up to 3x with exponential backoff and
    /// timeout doubling capped at 5s.
    pub async fn new(pool: DbPool, timeout: Duration) -> AppResult<Arc<Self>> {
        let (invalidate_tx, _) = broadcast::channel(16);
        let manager = Arc::new(Self {
            pool,
            timeout,
            cache: RwLock::new(Arc::new(GroupCache::default())),
            invalidate_tx,
            callbacks: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });

        let groups = load_with_retry(&manager.pool, timeout).await?;
        manager.install(groups);
        Ok(manager)
    }

    /// Builds a manager pre-populated with `groups` and no live DB pool,
    /// for tests of downstream consumers (e.g. aggregate-group validation)
    /// that only need cache lookups, never a reload.
    #[cfg(test)]
    pub(crate) fn new_for_test(groups: Vec<Group>) -> Arc<Self> {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .expect("lazy pool construction never fails");
        let (invalidate_tx, _) = broadcast::channel(16);
        let manager = Arc::new(Self {
            pool,
            timeout: Duration::from_millis(1200),
            cache: RwLock::new(Arc::new(GroupCache::default())),
            invalidate_tx,
            callbacks: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });
        manager.install(groups);
        manager
    }

    fn install(&self, groups: Vec<Group>) {
        let count = groups.len();
        let cache = Arc::new(GroupCache::build(groups));
        let snapshot: Vec<Arc<Group>> = cache.all();
        *self.cache.write() = cache;
        info!("group cache reloaded with {count} groups");
        for cb in self.callbacks.read().iter() {
            cb(&snapshot);
        }
    }

    pub fn on_reload(&self, callback: ReloadCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Group>> {
        self.cache.read().get_by_name(name)
    }

    pub fn get_by_id(&self, id: i64) -> Option<Arc<Group>> {
        self.cache.read().get_by_id(id)
    }

    pub fn list_groups(&self) -> Vec<Arc<Group>> {
        self.cache.read().all()
    }

    /// Synchronously rebuilds the snapshot from the database. On subsequent
    /// (non-initial) loads, a transient error serves the previous snapshot
    /// unchanged; a non-transient error propagates.
    pub async fn reload(&self) -> AppResult<()> {
        match loader::load_all_groups(&self.pool, self.timeout).await {
            Ok(groups) => {
                self.install(groups);
                Ok(())
            }
            Err(e) if e.is_transient() => {
                warn!("group reload hit a transient error, serving stale cache: {e}");
                Ok(())
            }
            Err(e) => {
                error!("group reload failed with a non-transient error: {e}");
                Err(e)
            }
        }
    }

    /// Publishes an invalidation notice and reloads locally. Delivery is
    /// at-least-once and order-independent: every subscriber re-reads the
    /// database itself rather than trusting message ordering.
    pub async fn invalidate(self: &Arc<Self>) -> AppResult<()> {
        let _ = self.invalidate_tx.send(());
        self.reload().await
    }

    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<()> {
        self.invalidate_tx.subscribe()
    }

    /// Spawns the background task that reloads on every local or
    /// cluster-broadcast invalidation, until `stop` is called.
    pub fn spawn_syncer(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let mut rx = manager.subscribe_invalidations();
        let shutdown = manager.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("group syncer shutting down");
                        return;
                    }
                    recv = rx.recv() => {
                        match recv {
                            Ok(()) => {
                                if let Err(e) = manager.reload().await {
                                    error!("group syncer reload failed: {e}");
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {
                                // Duplicate/coalesced reloads are tolerated by design.
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

async fn load_with_retry(pool: &DbPool, base_timeout: Duration) -> AppResult<Vec<Group>> {
    let mut attempt = 0;
    let mut timeout = base_timeout;
    loop {
        match loader::load_all_groups(pool, timeout).await {
            Ok(groups) => return Ok(groups),
            Err(e) if e.is_transient() && attempt + 1 < INITIAL_LOAD_MAX_ATTEMPTS => {
                attempt += 1;
                let backoff = Duration::from_millis(INITIAL_LOAD_BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!("initial group load attempt {attempt} failed transiently, retrying in {backoff:?}: {e}");
                tokio::time::sleep(backoff).await;
                timeout = Duration::from_millis((timeout.as_millis() as u64 * 2).min(INITIAL_LOAD_MAX_TIMEOUT_MS));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_is_the_well_known_constant() {
        assert_eq!(GROUPS_UPDATED_CHANNEL, "groups:updated");
    }
}
