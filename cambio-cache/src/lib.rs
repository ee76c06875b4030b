//! cambio-cache
//!
//! Async TTL + LRU cache with hit/miss statistics, glob invalidation, and a
//! periodic expiry sweep.
//!
//! Keys are trimmed and lower-cased before use; keys longer than 250
//! characters are stored under their SHA-256 digest.
#![warn(missing_docs)]
// Bindings that only feed log fields go unused without the `tracing` feature.
#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]
mod log;
mod cache;
mod pattern;

pub use crate::cache::{Cache, CacheStats, EntryInfo, Ttl};
pub use crate::pattern::{Glob, MAX_KEY_LEN, normalize_key};
