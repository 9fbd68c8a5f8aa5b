pub mod cached;
pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedCounterStore;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{CounterStore, DedupStore, StorageError, StorageResult};

use crate::config::{DatabaseBackend, DatabaseConfig};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Both store roles, usually backed by the same database
#[derive(Clone)]
pub struct Stores {
    pub dedup: Arc<dyn DedupStore>,
    pub counters: Arc<dyn CounterStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: DedupStore + CounterStore + 'static,
    {
        Self {
            dedup: backend.clone(),
            counters: backend,
        }
    }
}

/// Connect to the configured backend and create its schema
pub async fn open(config: &DatabaseConfig) -> Result<Stores> {
    let stores = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            let storage = SqliteStorage::new(&config.url, config.max_connections).await?;
            storage.init().await?;
            Stores::from_backend(Arc::new(storage))
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            let storage = PostgresStorage::new(&config.url, config.max_connections).await?;
            storage.init().await?;
            Stores::from_backend(Arc::new(storage))
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; counters are lost on restart");
            Stores::from_backend(Arc::new(MemoryStorage::new()))
        }
    };

    Ok(stores)
}
