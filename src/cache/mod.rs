//! Read-through cache of every flag definition.
//!
//! The whole mapping lives in one immutable [`Snapshot`] that is swapped in
//! atomically after each successful load, so readers never see a half-built
//! mapping. One TTL covers the whole snapshot. Refreshes are serialized; a
//! refresh that fails leaves the previous snapshot in place.

mod clock;

pub use clock::{Clock, SystemClock};

#[cfg(test)]
pub use clock::ManualClock;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::flags::FlagDefinition;
use crate::store::{bounded, FlagStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no flag snapshot available: {0}")]
    Unavailable(#[source] StoreError),
}

/// One refresh cycle's worth of flag definitions.
#[derive(Debug)]
pub struct Snapshot {
    flags: HashMap<String, FlagDefinition>,
    refreshed_at: DateTime<Utc>,
    generation: u64,
}

impl Snapshot {
    pub fn flags(&self) -> &HashMap<String, FlagDefinition> {
        &self.flags
    }

    pub fn get(&self, name: &str) -> Option<&FlagDefinition> {
        self.flags.get(name)
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub ready: bool,
    pub flag_count: usize,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub ttl_secs: u64,
    pub refreshes: u64,
    pub failed_refreshes: u64,
}

pub struct FlagCache {
    store: Arc<dyn FlagStore>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    store_timeout: Duration,
    snapshot: ArcSwapOption<Snapshot>,
    // Bumped by `invalidate`; a snapshot loaded under an older generation is stale.
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
}

impl FlagCache {
    pub fn new(
        store: Arc<dyn FlagStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            store_timeout,
            snapshot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
            failed_refreshes: AtomicU64::new(0),
        }
    }

    /// Definition for `name`, or `None` when the current snapshot has no such flag.
    pub async fn get(&self, name: &str) -> Result<Option<FlagDefinition>, CacheError> {
        let snapshot = self.current().await?;
        Ok(snapshot.get(name).cloned())
    }

    pub async fn get_all(&self) -> Result<Arc<Snapshot>, CacheError> {
        self.current().await
    }

    /// Makes the next read reload from the store regardless of snapshot age.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Flag cache invalidated");
    }

    /// Unconditionally reloads from the store, waiting for any refresh in flight.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, StoreError> {
        let _guard = self.refresh_lock.lock().await;
        self.load_snapshot().await.inspect_err(|e| {
            self.failed_refreshes.fetch_add(1, Ordering::SeqCst);
            error!(error = %e, "Flag cache refresh failed");
        })
    }

    pub fn status(&self) -> CacheStatus {
        let snapshot = self.snapshot.load_full();
        CacheStatus {
            ready: snapshot.is_some(),
            flag_count: snapshot.as_ref().map_or(0, |s| s.flags.len()),
            last_refreshed: snapshot.as_ref().map(|s| s.refreshed_at),
            ttl_secs: self.ttl.num_seconds().max(0) as u64,
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failed_refreshes: self.failed_refreshes.load(Ordering::SeqCst),
        }
    }

    async fn current(&self) -> Result<Arc<Snapshot>, CacheError> {
        let current = self.snapshot.load_full();
        let failures_seen = self.failed_refreshes.load(Ordering::SeqCst);

        let _guard = match &current {
            Some(snapshot) if self.is_fresh(snapshot) => return Ok(snapshot.clone()),
            // TTL-only expiry while someone else is refreshing: the old snapshot
            // is good enough. After an invalidation the caller must see new data.
            Some(snapshot) if !self.invalidated(snapshot) => match self.refresh_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("Refresh in flight, serving current snapshot");
                    return Ok(snapshot.clone());
                }
            },
            _ => self.refresh_lock.lock().await,
        };

        // Another caller may have finished a refresh while we waited.
        let current = self.snapshot.load_full();
        if let Some(snapshot) = current.as_ref().filter(|s| self.is_fresh(s)) {
            return Ok(snapshot.clone());
        }
        // A refresh failed while we waited; don't queue another load behind it.
        if self.failed_refreshes.load(Ordering::SeqCst) != failures_seen {
            debug!("Refresh failed while waiting, not retrying");
            return current.ok_or_else(|| {
                CacheError::Unavailable(StoreError::Unavailable(
                    "refresh failed while waiting".to_string(),
                ))
            });
        }

        match self.load_snapshot().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                self.failed_refreshes.fetch_add(1, Ordering::SeqCst);
                match current {
                    Some(stale) => {
                        warn!(
                            error = %e,
                            refreshed_at = %stale.refreshed_at,
                            "Flag cache refresh failed, serving stale snapshot"
                        );
                        Ok(stale)
                    }
                    None => {
                        error!(
                            error = %e,
                            "Flag cache refresh failed with no snapshot to fall back on"
                        );
                        Err(CacheError::Unavailable(e))
                    }
                }
            }
        }
    }

    // Caller must hold `refresh_lock`.
    async fn load_snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let flags = bounded(self.store_timeout, self.store.load_all()).await?;

        let snapshot = Arc::new(Snapshot {
            flags,
            refreshed_at: self.clock.now(),
            generation,
        });
        self.snapshot.store(Some(snapshot.clone()));
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(flags = snapshot.flags.len(), "Flag cache refreshed");
        Ok(snapshot)
    }

    fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        !self.expired(snapshot) && !self.invalidated(snapshot)
    }

    fn expired(&self, snapshot: &Snapshot) -> bool {
        let age = self.clock.now() - snapshot.refreshed_at;
        // A clock that moved backwards also counts as expired.
        age >= self.ttl || age < TimeDelta::zero()
    }

    fn invalidated(&self, snapshot: &Snapshot) -> bool {
        snapshot.generation < self.generation.load(Ordering::SeqCst)
    }
}
