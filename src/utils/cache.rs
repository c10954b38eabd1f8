//! High-Performance In-Memory Result Cache
//!
//! Thread-safe memoization of scoring results per (chain, wallet).
//! Menggunakan DashMap untuk concurrent access tanpa lock contention.
//!
//! Features:
//! - TTL-based expiration (5 menit default), lazy on read plus `cleanup_expired`
//! - At most one computation in flight per key; concurrent callers join it
//! - Computations run in their own task, so a cancelled waiter never cancels others
//! - Failures reach every current waiter and are never stored
//! - Optional capacity bound, oldest entry evicted first
//! - Cache HIT/MISS logging and counters

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::config::CacheConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::Chain;

/// Cache key: normalized wallet on one chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chain: Chain,
    pub wallet: String,
}

impl CacheKey {
    pub fn new(chain: Chain, wallet: impl Into<String>) -> Self {
        Self {
            chain,
            wallet: wallet.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.wallet)
    }
}

/// Cache entry dengan timestamp untuk TTL validation
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Sisa waktu sebelum expired
    fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created_at))
    }
}

type SharedCompute<V> = Shared<BoxFuture<'static, AppResult<V>>>;

/// Removes the in-flight registration when the computation task ends (or unwinds)
struct InFlightGuard<V: Clone> {
    in_flight: Arc<DashMap<CacheKey, SharedCompute<V>>>,
    key: CacheKey,
}

impl<V: Clone> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

/// TTL cache with single-flight computation
pub struct ResultCache<V: Clone> {
    store: Arc<DashMap<CacheKey, CacheEntry<V>>>,
    in_flight: Arc<DashMap<CacheKey, SharedCompute<V>>>,
    ttl: Duration,
    /// `None` = unbounded
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl: config.ttl,
            capacity: config.capacity.filter(|c| *c > 0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Buat cache dengan custom TTL (unbounded)
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(&CacheConfig { ttl, capacity: None })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value without touching counters; expired entries are ignored
    fn peek(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        self.store
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Get dari cache dengan TTL validation
    /// Returns Some(value) jika HIT dan belum expired, None jika MISS atau expired
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!(
                    "✅ CACHE HIT: {} (TTL: {}s remaining)",
                    key,
                    entry.remaining_ttl(now).as_secs()
                );
                return Some(entry.value.clone());
            }
        }

        // Only drop the entry if it is still the expired one
        if self.store.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            debug!("📭 CACHE MISS (expired): {}", key);
        } else {
            debug!("📭 CACHE MISS: {}", key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a successful value
    pub fn insert(&self, key: CacheKey, value: V) {
        insert_entry(&self.store, self.capacity, key, value, self.ttl);
    }

    /// Return the cached value or run `compute` exactly once for all concurrent callers
    ///
    /// The flag is `true` when the value came from the store.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> AppResult<(V, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<V>> + Send + 'static,
    {
        if let Some(value) = self.get(&key) {
            return Ok((value, true));
        }

        let shared = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(running) => {
                debug!("⏳ Joining in-flight computation: {}", key);
                running.get().clone()
            }
            Entry::Vacant(slot) => {
                // A computation may have landed between the read above and this lock
                if let Some(value) = self.peek(&key) {
                    return Ok((value, true));
                }

                let task = compute();
                let guard = InFlightGuard {
                    in_flight: self.in_flight.clone(),
                    key: key.clone(),
                };
                let store = self.store.clone();
                let capacity = self.capacity;
                let ttl = self.ttl;

                let handle = tokio::spawn(async move {
                    let guard = guard;
                    let result = task.await;
                    if let Ok(value) = &result {
                        // Visible in the store before the in-flight slot disappears
                        insert_entry(&store, capacity, guard.key.clone(), value.clone(), ttl);
                    }
                    drop(guard);
                    result
                });

                let shared = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(AppError::internal(format!("score computation aborted: {}", e)))
                    })
                }
                .boxed()
                .shared();
                slot.insert(shared.clone());
                shared
            }
        };

        shared.await.map(|value| (value, false))
    }

    /// Hapus entry dari cache
    pub fn invalidate(&self, key: &CacheKey) {
        self.store.remove(key);
        debug!("🗑️ CACHE INVALIDATE: {}", key);
    }

    /// Bersihkan semua entry yang expired
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            info!("🧹 CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Get statistik cache
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            in_flight: self.in_flight.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
            capacity: self.capacity,
        }
    }

    /// Clear semua cache
    pub fn clear(&self) {
        self.store.clear();
        info!("🗑️ CACHE CLEARED");
    }
}

fn insert_entry<V>(
    store: &DashMap<CacheKey, CacheEntry<V>>,
    capacity: Option<usize>,
    key: CacheKey,
    value: V,
    ttl: Duration,
) {
    let now = Instant::now();
    if let Some(capacity) = capacity {
        if !store.contains_key(&key) && store.len() >= capacity {
            store.retain(|_, entry| !entry.is_expired(now));
        }
        while !store.contains_key(&key) && store.len() >= capacity {
            let oldest = store
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(oldest) => {
                    store.remove(&oldest);
                    debug!("🗑️ CACHE EVICT (capacity): {}", oldest);
                }
                None => break,
            }
        }
    }

    info!("💾 CACHE SET: {} (TTL: {}s)", key, ttl.as_secs());
    store.insert(
        key,
        CacheEntry {
            value,
            created_at: now,
            ttl,
        },
    );
}

/// Statistik cache untuk monitoring
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
    pub capacity: Option<usize>,
}
