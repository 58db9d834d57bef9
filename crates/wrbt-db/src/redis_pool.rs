//! Redis-backed rate-limit counters for multi-instance deployments.

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::store::{CounterStore, WindowCount};

const KEY_PREFIX: &str = "wrbt:ratelimit:";

/// Increment a fixed-window counter atomically.
///
/// `SET NX PX` opens the window only if none exists, so the TTL is set once
/// per window and never extended by later hits.
pub async fn incr_window(
    conn: &mut ConnectionManager,
    key: &str,
    window: Duration,
) -> Result<(u64, i64), redis::RedisError> {
    let window_ms = window.as_millis().max(1) as u64;
    let (count, pttl): (u64, i64) = redis::pipe()
        .atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("NX")
        .arg("PX")
        .arg(window_ms)
        .ignore()
        .cmd("INCR")
        .arg(key)
        .cmd("PTTL")
        .arg(key)
        .query_async(conn)
        .await?;
    Ok((count, pttl))
}

#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting to Redis...");
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let mut conn = self.conn.clone();
        let (count, pttl) = incr_window(&mut conn, &format!("{KEY_PREFIX}{key}"), window).await?;

        // PTTL is negative if the key vanished between commands; treat as a fresh window.
        let resets_in = u64::try_from(pttl)
            .map(Duration::from_millis)
            .unwrap_or(window);
        Ok(WindowCount { count, resets_in })
    }
}
