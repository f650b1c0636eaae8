pub mod config;
pub mod entries;
pub mod server;
pub mod store;

use std::sync::Arc;

use crate::config::{Config, EntriesConfig, StoreBackend, StoreConfig};
use crate::entries::EntryEnumerator;
use crate::store::{MemoryStore, RespOptions, RespStore, StoreClient};

// ========================================
// ENGINE
// ========================================

/// Shared state handed to every request.
/// Cheap to clone: the store sits behind an `Arc`.
#[derive(Clone)]
pub struct RedismanEngine {
    pub store: Arc<dyn StoreClient>,
    pub entries: EntryEnumerator,
}

impl RedismanEngine {
    /// Builds the configured store backend. Must run inside a tokio runtime.
    pub fn new(config: &Config) -> Self {
        Self::with_store(connect_store(&config.store), config.entries.clone())
    }

    pub fn with_store(store: Arc<dyn StoreClient>, entries: EntriesConfig) -> Self {
        Self {
            entries: EntryEnumerator::new(store.clone(), entries),
            store,
        }
    }
}

fn connect_store(config: &StoreConfig) -> Arc<dyn StoreClient> {
    match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(config.cleanup_interval)),
        StoreBackend::Resp => Arc::new(RespStore::new(RespOptions {
            addr: config.addr.clone(),
            password: config.password.clone(),
            database: config.database,
            max_idle: config.pool_max_idle,
            connect_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
        })),
    }
}
