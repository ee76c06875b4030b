//! cambio-core
//!
//! Core types, traits, and transport shared across the cambio workspace.
//!
//! - `model`: value objects (`Quote`, `HistoricalPoint`, `ResponseEnvelope`).
//! - `rate_limit`: the per-client sliding-window `RateLimiter`.
//! - `http`: `HttpClient`, the retrying transport provider connectors build on.
//! - `connector`: the `PriceConnector` trait and capability provider traits.
//! - `store`: the `PriceStore` persistence seam and an in-memory implementation.
//!
//! Async runtime (Tokio)
//! ---------------------
//! Rate-limit waits, retry backoff, and background tasks use Tokio timers and
//! `tokio::time::Instant`, so code in this crate must run under a Tokio 1.x
//! runtime. Tests may pause the clock.
#![warn(missing_docs)]
// Bindings that only feed log fields go unused without the `tracing` feature.
#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]
mod log;
/// Connector capability traits and the primary `PriceConnector` interface.
pub mod connector;
/// Rate-limited, retrying HTTP transport.
pub mod http;
pub mod model;
/// Sliding-window request throttle.
pub mod rate_limit;
pub mod store;
/// Background loop handle with cooperative shutdown.
pub mod task;

pub use cambio_types::{
    CacheConfig, CambioError, Capability, ClientConfig, DataSource, RateLimitPolicy, ServiceConfig,
};
pub use connector::{
    BatchPriceProvider, ClientStats, DEFAULT_SUPPORTED_CURRENCIES, HistoryProvider, PriceConnector,
    PriceProvider,
};
pub use http::{ApiKeyHeader, AuthScheme, HttpClient};
pub use model::{HistoricalPoint, Payload, Quote, ResponseEnvelope};
pub use rate_limit::RateLimiter;
pub use store::{MemoryStore, PriceStore};
pub use task::BackgroundTask;

pub use chrono::{DateTime, Utc};
pub use reqwest::Method;
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use rust_decimal::Decimal;
