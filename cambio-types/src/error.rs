use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the cambio workspace.
///
/// Covers argument validation, transport failures classified by retryability,
/// provider-tagged failures, persistence failures, and aggregates produced when
/// several providers (or several lifecycle steps) are attempted.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CambioError {
    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Issues with the returned or expected data (missing fields, etc.).
    #[error("data issue: {0}")]
    Data(String),

    /// The requested capability is not offered by any candidate connector.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// Capability label (e.g. "historical-prices").
        capability: String,
    },

    /// An individual connector returned a non-retryable error.
    #[error("{connector} failed: {msg}")]
    Connector {
        /// Connector name that failed.
        connector: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A failure worth retrying: network error, timeout, HTTP 5xx or 429.
    #[error("{connector} transient failure: {msg}")]
    Transient {
        /// Connector name that failed.
        connector: String,
        /// Human-readable error message.
        msg: String,
    },

    /// The provider rejected our credentials.
    #[error("{connector} rejected credentials (status {status})")]
    Authentication {
        /// Connector name that rejected the request.
        connector: String,
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// Every attempt within the retry budget failed.
    #[error("{connector} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Connector name.
        connector: String,
        /// Number of attempts made.
        attempts: u32,
        /// Rendering of the last failure.
        last: String,
    },

    /// The caller's deadline was reached before a successful attempt.
    #[error("{connector} deadline exceeded after {attempts} attempts")]
    DeadlineExceeded {
        /// Connector name.
        connector: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// An individual provider call exceeded the configured timeout.
    #[error("provider timed out: {capability} via {connector}")]
    ProviderTimeout {
        /// Connector name that timed out.
        connector: String,
        /// Capability label.
        capability: String,
    },

    /// All attempted providers timed out for the requested capability.
    #[error("all providers timed out: {capability}")]
    AllProvidersTimedOut {
        /// Capability label that timed out across all providers.
        capability: String,
    },

    /// A resource or symbol could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of missing resource, e.g. "current-price for BTC/usd".
        what: String,
    },

    /// All selected providers failed; contains the individual failures.
    #[error("all providers failed: {0:?}")]
    AllProvidersFailed(Vec<CambioError>),

    /// The persistence collaborator failed.
    #[error("store error: {0}")]
    Store(String),

    /// One or more start/stop steps failed; the rest were still attempted.
    #[error("lifecycle errors: {0:?}")]
    Lifecycle(Vec<CambioError>),

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl CambioError {
    /// Helper: build an `Unsupported` error for a capability string.
    #[must_use]
    pub fn unsupported(cap: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: cap.into(),
        }
    }

    /// Helper: build a `Connector` error with the connector name and message.
    pub fn connector(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connector {
            connector: connector.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Transient` error.
    pub fn transient(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            connector: connector.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `ProviderTimeout` error.
    pub fn provider_timeout(connector: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            connector: connector.into(),
            capability: capability.into(),
        }
    }

    /// Helper: build a `Store` error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether a transport-level retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::ProviderTimeout { .. })
    }

    /// Returns true if this error should be surfaced to users as actionable.
    ///
    /// Capability absence and benign not-found conditions are not actionable.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        match self {
            Self::Unsupported { .. } | Self::NotFound { .. } => false,
            Self::AllProvidersFailed(inner) | Self::Lifecycle(inner) => {
                inner.iter().any(Self::is_actionable)
            }
            _ => true,
        }
    }

    /// Flatten nested aggregates into a plain vector.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::AllProvidersFailed(list) | Self::Lifecycle(list) => {
                list.into_iter().flat_map(Self::flatten).collect()
            }
            other => vec![other],
        }
    }
}
