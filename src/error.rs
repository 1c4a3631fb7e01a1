use std::error::Error;
use std::fmt;
use std::fmt::Display;

use web_time::Duration;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), ReplayError>`].
///
/// A failed fetch is never fatal for playback: the [`FrameCache`] leaves its stored frames in
/// place and re-requests the failed range on the next [`ensure`] call.
///
/// [`Result<(), ReplayError>`]: std::result::Result
/// [`FrameCache`]: crate::FrameCache
/// [`ensure`]: crate::FrameCache::ensure
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// The future of a fetch task resolved to an error.
    FetchFailed {
        /// Start of the half-open interval that was requested.
        start_t: f64,
        /// End of the half-open interval that was requested.
        end_t: f64,
        /// A description of what went wrong, as reported by the fetch collaborator.
        context: String,
    },
    /// A fetch task did not resolve within the configured request timeout.
    FetchTimeout {
        /// Start of the half-open interval that was requested.
        start_t: f64,
        /// End of the half-open interval that was requested.
        end_t: f64,
        /// The timeout that expired.
        timeout: Duration,
    },
    /// A window with non-finite bounds or `low > high` was passed to `ensure`.
    InvalidWindow {
        /// The requested lower bound.
        low: f64,
        /// The requested upper bound.
        high: f64,
    },
    /// A configuration value was rejected.
    InvalidConfig {
        /// Further specifies why the configuration was invalid.
        info: String,
    },
    /// A frame payload could not be decoded.
    Decode {
        /// A description of what failed to decode.
        context: String,
    },
}

impl ReplayError {
    /// Convenience constructor for [`ReplayError::FetchFailed`].
    #[must_use]
    pub fn fetch_failed(start_t: f64, end_t: f64, context: impl Into<String>) -> Self {
        Self::FetchFailed {
            start_t,
            end_t,
            context: context.into(),
        }
    }

    /// Convenience constructor for [`ReplayError::InvalidConfig`].
    #[must_use]
    pub fn invalid_config(info: impl Into<String>) -> Self {
        Self::InvalidConfig { info: info.into() }
    }

    /// Returns `true` for errors produced by the network side (failures and timeouts).
    ///
    /// These are transient: the next `ensure` call retries the same range.
    #[must_use]
    pub const fn is_fetch_error(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::FetchTimeout { .. })
    }
}

impl Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::FetchFailed {
                start_t,
                end_t,
                context,
            } => {
                write!(f, "Fetch of [{}, {}) failed: {}", start_t, end_t, context)
            },
            ReplayError::FetchTimeout {
                start_t,
                end_t,
                timeout,
            } => {
                write!(
                    f,
                    "Fetch of [{}, {}) timed out after {}ms",
                    start_t,
                    end_t,
                    timeout.as_millis()
                )
            },
            ReplayError::InvalidWindow { low, high } => {
                write!(
                    f,
                    "Invalid window [{}, {}]: bounds must be finite and low <= high",
                    low, high
                )
            },
            ReplayError::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            },
            ReplayError::Decode { context } => {
                write!(f, "Decode error: {}", context)
            },
        }
    }
}

impl Error for ReplayError {}
