//! Cambio-wide error, source, and configuration primitives shared by every crate in the workspace.
#![warn(missing_docs)]

mod capability;
mod config;
mod error;
mod source;

pub use capability::Capability;
pub use config::{CacheConfig, ClientConfig, RateLimitPolicy, ServiceConfig};
pub use error::CambioError;
pub use source::DataSource;
