//! # wrbt-db
//!
//! Storage layer for bot authentication. Backends:
//! - **PostgreSQL**: bot identities, request audit log, allowlist
//! - **Redis**: shared rate-limit counters across instances
//! - **In-memory**: lite mode (no external services) and tests

pub mod memory;
pub mod postgres;
pub mod redis_pool;
pub mod repository;
pub mod store;

use anyhow::Result;
use std::sync::Arc;

use wrbt_common::config::AppConfig;

pub use memory::{MemoryAllowlistStore, MemoryAuditStore, MemoryBotStore, MemoryCounterStore};
pub use redis_pool::RedisCounterStore;
pub use repository::PgStore;
pub use store::{AllowlistStore, AuditStore, BotStore, CounterStore, WindowCount};

/// The set of storage backends the API runs against, chosen once at startup.
#[derive(Clone)]
pub struct Stores {
    pub bots: Arc<dyn BotStore>,
    pub audit: Arc<dyn AuditStore>,
    pub allowlist: Arc<dyn AllowlistStore>,
    pub counters: Arc<dyn CounterStore>,
    /// Set when counters are in-process, so the owner can schedule purges.
    pub memory_counters: Option<Arc<MemoryCounterStore>>,
}

impl Stores {
    /// Connect to whatever the config names. A missing database URL selects
    /// the in-memory registry; a missing Redis URL selects in-process counters.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let mut stores = Self::in_memory();

        match config.database.url.as_deref() {
            Some(url) => {
                let pool = postgres::connect(url, &config.database, config.storage.timeout()).await?;
                postgres::migrate(&pool).await?;
                let pg = Arc::new(PgStore::new(pool));
                stores.bots = pg.clone();
                stores.audit = pg.clone();
                stores.allowlist = pg;
            }
            None => {
                tracing::warn!("No database URL configured; bot registry is in-memory and will not survive a restart");
            }
        }

        if let Some(url) = config.redis.url.as_deref() {
            stores.counters = Arc::new(RedisCounterStore::connect(url).await?);
            stores.memory_counters = None;
        }

        Ok(stores)
    }

    /// Fully in-process backends.
    pub fn in_memory() -> Self {
        let counters = Arc::new(MemoryCounterStore::new());
        Self {
            bots: Arc::new(MemoryBotStore::new()),
            audit: Arc::new(MemoryAuditStore::new()),
            allowlist: Arc::new(MemoryAllowlistStore::new()),
            counters: counters.clone(),
            memory_counters: Some(counters),
        }
    }
}
