use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{FlagStore, Result, StoreError};
use crate::flags::FlagDefinition;

/// Process-local store. Used when no database is configured, and by tests,
/// which can take it offline or slow it down to simulate a sick backend.
#[derive(Default)]
pub struct InMemoryFlagStore {
    flags: RwLock<HashMap<String, FlagDefinition>>,
    offline: AtomicBool,
    delay_ms: AtomicU64,
    loads: AtomicU64,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_flags(flags: impl IntoIterator<Item = FlagDefinition>) -> Self {
        let map = flags.into_iter().map(|f| (f.name.clone(), f)).collect();
        Self {
            flags: RwLock::new(map),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `load_all` calls that reached the backing map.
    #[cfg(test)]
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    async fn check_online(&self) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl FlagStore for InMemoryFlagStore {
    async fn load_all(&self) -> Result<HashMap<String, FlagDefinition>> {
        self.check_online().await?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.flags.read().await.clone())
    }

    async fn get(&self, name: &str) -> Result<Option<FlagDefinition>> {
        self.check_online().await?;
        Ok(self.flags.read().await.get(name).cloned())
    }

    async fn insert(&self, flag: &FlagDefinition) -> Result<bool> {
        self.check_online().await?;
        match self.flags.write().await.entry(flag.name.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(flag.clone());
                Ok(true)
            }
        }
    }

    async fn upsert(&self, flag: &FlagDefinition) -> Result<()> {
        self.check_online().await?;
        self.flags
            .write()
            .await
            .insert(flag.name.clone(), flag.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.check_online().await?;
        Ok(self.flags.write().await.remove(name).is_some())
    }
}
