mod memory;
mod postgres;

pub use memory::InMemoryFlagStore;
pub use postgres::PgFlagStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::flags::FlagDefinition;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("flag store unavailable: {0}")]
    Unavailable(String),
    #[error("flag store call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable home of flag definitions, addressed by flag name.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn load_all(&self) -> Result<HashMap<String, FlagDefinition>>;
    async fn get(&self, name: &str) -> Result<Option<FlagDefinition>>;
    /// Stores a new flag. Returns `false`, leaving the stored copy untouched,
    /// when the name is already taken.
    async fn insert(&self, flag: &FlagDefinition) -> Result<bool>;
    async fn upsert(&self, flag: &FlagDefinition) -> Result<()>;
    /// Returns `false` when no flag with that name existed.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// Runs a store call under a deadline so a hung backend cannot stall callers.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
