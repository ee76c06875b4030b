use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::log::{debug, info, warn};
use crate::pattern::{Glob, normalize_key};
use cambio_core::BackgroundTask;
use cambio_types::{CacheConfig, CambioError};

/// Expiry requested for one `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use `CacheConfig::default_ttl`.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after the given duration; zero means never.
    After(Duration),
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Self::Never } else { Self::After(d) }
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Default, Self::from)
    }
}

/// Counters and occupancy at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned a live value.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// `hits / (hits + misses)` as a percentage, rounded to two decimals.
    pub hit_rate: f64,
    /// Entries removed to stay within `max_size`.
    pub evictions: u64,
    /// Entries currently stored, including expired ones not yet swept.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
}

/// Metadata about one live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Successful lookups since the entry was last set.
    pub access_count: u64,
    /// Time since the entry was last set.
    pub age: Duration,
    /// Time since the last successful lookup (or the set).
    pub idle: Duration,
    /// Time until expiry; `None` for entries that never expire.
    pub expires_in: Option<Duration>,
}

struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
    access_count: u64,
    last_accessed: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

struct State<V> {
    entries: LruCache<String, Entry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> State<V> {
    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            self.entries.pop(k);
        }
        expired.len()
    }
}

/// Async TTL + LRU key/value cache.
///
/// Every operation is serialized through one lock, so a `get` that starts after
/// a `set` has returned always observes it. Expired entries are masked on lookup,
/// removed lazily, and swept periodically once [`Cache::start`] has been called.
pub struct Cache<V> {
    state: Arc<Mutex<State<V>>>,
    config: CacheConfig,
    max_size: usize,
    sweeper: std::sync::Mutex<Option<BackgroundTask>>,
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V> Cache<V> {
    /// Empty cache; a `max_size` of zero is treated as one.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                entries: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
            })),
            max_size: config.max_size.max(1),
            config,
            sweeper: std::sync::Mutex::new(None),
        }
    }

    /// Configuration in force.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn expiry(&self, now: Instant, ttl: Ttl) -> Option<Instant> {
        let ttl = match ttl {
            Ttl::Never => return None,
            Ttl::Default => self.config.default_ttl,
            Ttl::After(d) => d,
        };
        if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        }
    }

    /// Store `value` under `key` and evict least-recently-used entries beyond capacity.
    ///
    /// Setting an existing key replaces its value, expiry, and access count.
    /// Returns whether the entry is stored once eviction has run.
    pub async fn set(&self, key: &str, value: V, ttl: Ttl) -> bool {
        let key = normalize_key(key);
        let now = Instant::now();
        let entry = Entry {
            value,
            created_at: now,
            expires_at: self.expiry(now, ttl),
            access_count: 0,
            last_accessed: now,
        };
        let mut state = self.state.lock().await;
        state.entries.put(key.clone(), entry);
        while state.entries.len() > self.max_size {
            if let Some((evicted, _)) = state.entries.pop_lru() {
                state.evictions += 1;
                debug!(key = %evicted, "cache eviction");
            }
        }
        state.entries.contains(&key)
    }

    /// Remove `key`; returns whether a live entry was present.
    pub async fn delete(&self, key: &str) -> bool {
        let key = normalize_key(key);
        let mut state = self.state.lock().await;
        state
            .entries
            .pop(&key)
            .is_some_and(|e| !e.is_expired(Instant::now()))
    }

    /// Remove every entry; returns how many were stored.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let n = state.entries.len();
        state.entries.clear();
        n
    }

    /// Remove every key matching the shell-style `pattern`; returns how many were removed.
    ///
    /// Keys long enough to be stored as digests only match patterns that match the digest.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a malformed pattern.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CambioError> {
        let glob = Glob::new(pattern)?;
        let mut state = self.state.lock().await;
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(k, _)| glob.matches(k))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            state.entries.pop(k);
        }
        debug!(pattern = glob.as_str(), removed = doomed.len(), "cache pattern invalidated");
        Ok(doomed.len())
    }

    /// Remove every expired entry now; returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.state.lock().await.sweep(Instant::now())
    }

    /// Counters and occupancy.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let total = state.hits + state.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            ((state.hits as f64 / total as f64) * 10_000.0).round() / 100.0
        };
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            evictions: state.evictions,
            size: state.entries.len(),
            max_size: self.max_size,
        }
    }

    /// Metadata for a live entry without touching recency or counters.
    pub async fn inspect(&self, key: &str) -> Option<EntryInfo> {
        let key = normalize_key(key);
        let now = Instant::now();
        let state = self.state.lock().await;
        let entry = state.entries.peek(&key).filter(|e| !e.is_expired(now))?;
        Some(EntryInfo {
            access_count: entry.access_count,
            age: now.saturating_duration_since(entry.created_at),
            idle: now.saturating_duration_since(entry.last_accessed),
            expires_in: entry.expires_at.map(|t| t.saturating_duration_since(now)),
        })
    }

    /// Whether the periodic sweeper is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Stop the periodic sweeper, waiting up to `shutdown_grace` before aborting it.
    pub async fn stop(&self) {
        let task = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if task.stop(self.config.shutdown_grace).await {
                debug!("cache sweeper stopped");
            } else {
                warn!("cache sweeper did not stop within grace period, aborted");
            }
        }
    }
}

impl<V: Clone> Cache<V> {
    /// Live value for `key`, refreshing its recency.
    ///
    /// An expired entry is removed and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let key = normalize_key(key);
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let expired = state.entries.peek(&key).map(|e| e.is_expired(now));
        let live = match expired {
            Some(false) => state.entries.get_mut(&key).map(|entry| {
                entry.access_count += 1;
                entry.last_accessed = now;
                entry.value.clone()
            }),
            Some(true) => {
                state.entries.pop(&key);
                None
            }
            None => None,
        };
        if live.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        live
    }

    /// Live value for `key`, or `default` on a miss.
    pub async fn get_or(&self, key: &str, default: V) -> V {
        self.get(key).await.unwrap_or(default)
    }

    /// Same lookup semantics as [`Cache::get`], including counters and recency.
    pub async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Return the live value for `key`, or compute, store, and return it.
    ///
    /// The lock is not held while `factory` runs, so concurrent callers missing on
    /// the same key may each invoke their factory; the last `set` wins.
    pub async fn get_or_set<F, Fut>(&self, key: &str, factory: F, ttl: Ttl) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(v) = self.get(key).await {
            return v;
        }
        let value = factory().await;
        self.set(key, value.clone(), ttl).await;
        value
    }

    /// Fallible [`Cache::get_or_set`]; an `Err` from `factory` is returned and nothing is stored.
    ///
    /// # Errors
    /// Propagates the factory's error.
    pub async fn try_get_or_set<F, Fut, E>(&self, key: &str, factory: F, ttl: Ttl) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(key).await {
            return Ok(v);
        }
        let value = factory().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }
}

impl<V: Send + 'static> Cache<V> {
    /// Start the periodic expiry sweep. No-op when already running.
    pub fn start(&self) {
        let mut slot = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let state = Arc::clone(&self.state);
        let every = self.config.cleanup_interval.max(Duration::from_millis(1));
        *slot = Some(BackgroundTask::spawn(move |mut stop_rx| async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = state.lock().await.sweep(Instant::now());
                        if removed > 0 {
                            info!(removed, "cache sweep removed expired entries");
                        }
                    }
                }
            }
        }));
        debug!(
            interval_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX),
            "cache sweeper started"
        );
    }
}
