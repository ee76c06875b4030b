//! Logging macros that forward to `tracing` when the `tracing` feature is on
//! and expand to nothing otherwise.

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)+);
        }
    }};
}

macro_rules! info {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        {
            tracing::info!($($arg)+);
        }
    }};
}

macro_rules! warn_ {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        {
            tracing::warn!($($arg)+);
        }
    }};
}

#[allow(unused_imports)]
pub(crate) use {debug, info, warn_ as warn};
