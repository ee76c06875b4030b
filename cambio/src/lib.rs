//! Cambio serves crypto market data from several providers behind one cache.
//!
//! Overview
//! - `ClientRegistry` holds one primary connector and ordered fallbacks and
//!   walks them in order until one answers.
//! - `DataService` puts a TTL + LRU cache in front of the registry, writes fresh
//!   data through to a `PriceStore`, and falls back to stored data when every
//!   provider fails.
//! - Connectors implement the `cambio_core` contracts; each owns an `HttpClient`
//!   with its own rate limiter and retry policy.
//!
//! Key behaviors and trade-offs
//! - Failover is sequential: the primary is always asked first, so fallbacks see
//!   no load while it is healthy, at the cost of latency when it is not.
//! - A failed provider call never fails a price lookup; callers get `None` (or a
//!   shorter list) and the cause is logged.
//! - Stored quotes stand in for failed fetches only while younger than
//!   `ServiceConfig::store_freshness`.
//! - Stored history is served without a network call when it spans the whole
//!   requested range; only the endpoints are checked.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use cambio::{CachePolicy, ClientRegistry, DataService};
//! use cambio_coingecko::CoinGeckoConnector;
//!
//! let coingecko = Arc::new(CoinGeckoConnector::new(None)?);
//! let registry = ClientRegistry::builder().primary(coingecko).build()?;
//! let service = DataService::builder().registry(registry).build()?;
//! service.start().await?;
//!
//! let btc = service.current_price("BTC", "usd", CachePolicy::default()).await?;
//! service.shutdown().await?;
//! ```
#![warn(missing_docs)]
// Bindings that only feed log fields go unused without the `tracing` feature.
#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]
mod log;
/// Cache key layout.
pub mod keys;
mod registry;
mod service;

pub use registry::{ClientRegistry, ClientRegistryBuilder, collapse_errors};
pub use service::{CachePolicy, DataService, DataServiceBuilder, HealthReport};

pub use cambio_cache::{Cache, CacheStats, EntryInfo, Ttl};
pub use cambio_core::{
    BatchPriceProvider, CacheConfig, CambioError, Capability, ClientConfig, ClientStats,
    DataSource, DateTime, Decimal, HistoricalPoint, HistoryProvider, HttpClient, MemoryStore,
    PriceConnector, PriceProvider, PriceStore, Quote, RateLimitPolicy, RateLimiter,
    ServiceConfig, Utc,
};
