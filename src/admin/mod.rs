use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::cache::FlagCache;
use crate::flags::{FlagDefinition, FlagPatch, FlagType, TargetingRules};
use crate::store::{bounded, FlagStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Flag '{0}' not found")]
    NotFound(String),
    #[error("Flag with name '{0}' already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, AdminError>;

#[derive(Debug, Clone)]
pub struct NewFlag {
    pub name: String,
    pub flag_type: FlagType,
    pub default_value: Option<String>,
    pub enabled: bool,
    pub targeting_rules: TargetingRules,
}

/// Writes flag definitions through to the store and makes them visible to
/// readers by invalidating the cache after every successful write.
pub struct FlagAdminService {
    store: Arc<dyn FlagStore>,
    cache: Arc<FlagCache>,
    store_timeout: Duration,
    // Serializes read-modify-write cycles issued by this process.
    write_lock: Mutex<()>,
}

impl FlagAdminService {
    pub fn new(store: Arc<dyn FlagStore>, cache: Arc<FlagCache>, store_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            store_timeout,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn create(&self, new_flag: NewFlag) -> Result<FlagDefinition> {
        let flag = FlagDefinition {
            default_value: new_flag
                .default_value
                .unwrap_or_else(|| new_flag.flag_type.zero_text().to_string()),
            name: new_flag.name,
            flag_type: new_flag.flag_type,
            enabled: new_flag.enabled,
            targeting_rules: new_flag.targeting_rules,
        };
        flag.validate().map_err(AdminError::Invalid)?;

        if !bounded(self.store_timeout, self.store.insert(&flag)).await? {
            return Err(AdminError::AlreadyExists(flag.name));
        }
        self.cache.invalidate();

        info!(flag = %flag.name, "Flag created");
        Ok(flag)
    }

    pub async fn update(&self, name: &str, patch: FlagPatch) -> Result<FlagDefinition> {
        if patch.is_empty() {
            return Err(AdminError::Invalid("No valid fields to update".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let current = self.load(name).await?;
        let flag = patch.apply_to(current);
        flag.validate().map_err(AdminError::Invalid)?;

        bounded(self.store_timeout, self.store.upsert(&flag)).await?;
        self.cache.invalidate();

        info!(flag = %name, "Flag updated");
        Ok(flag)
    }

    /// Flips the global kill switch.
    pub async fn toggle(&self, name: &str) -> Result<FlagDefinition> {
        let _guard = self.write_lock.lock().await;
        let mut flag = self.load(name).await?;
        flag.enabled = !flag.enabled;

        bounded(self.store_timeout, self.store.upsert(&flag)).await?;
        self.cache.invalidate();

        info!(flag = %name, enabled = flag.enabled, "Flag toggled");
        Ok(flag)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !bounded(self.store_timeout, self.store.delete(name)).await? {
            return Err(AdminError::NotFound(name.to_string()));
        }
        self.cache.invalidate();

        info!(flag = %name, "Flag deleted");
        Ok(())
    }

    // Reads from the store, not the cache: patches must apply to the latest copy.
    async fn load(&self, name: &str) -> Result<FlagDefinition> {
        bounded(self.store_timeout, self.store.get(name))
            .await?
            .ok_or_else(|| AdminError::NotFound(name.to_string()))
    }
}
