//! Rate limit policy configuration.

use thiserror::Error;
use time::Duration;

/// Longest window a policy accepts.
pub const MAX_WINDOW: Duration = Duration::days(365);

/// Errors raised when a rate limit policy is constructed with bad values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The policy must allow at least one call per window
    #[error("max calls per window must be at least 1")]
    ZeroMaxCalls,

    /// The window must span a positive amount of time
    #[error("window duration must be positive, got {0}")]
    NonPositiveWindow(Duration),

    /// The window must not exceed `MAX_WINDOW`
    #[error("window duration must be at most {}, got {0}", MAX_WINDOW)]
    WindowTooLong(Duration),
}

/// Immutable sliding-window rate limit policy.
///
/// A session may make at most `max_calls_per_window` calls within any trailing
/// span of `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_calls_per_window: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Creates a new policy.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::ZeroMaxCalls` if `max_calls_per_window` is zero and
    /// `PolicyError::NonPositiveWindow` if `window` is zero or negative.
    /// Windows longer than `MAX_WINDOW` return `PolicyError::WindowTooLong`.
    pub fn new(max_calls_per_window: u32, window: Duration) -> Result<Self, PolicyError> {
        if max_calls_per_window < 1 {
            return Err(PolicyError::ZeroMaxCalls);
        }
        if !window.is_positive() {
            return Err(PolicyError::NonPositiveWindow(window));
        }
        if window > MAX_WINDOW {
            return Err(PolicyError::WindowTooLong(window));
        }

        Ok(Self {
            max_calls_per_window,
            window,
        })
    }

    /// Returns the maximum number of calls admitted per window.
    pub fn max_calls_per_window(&self) -> u32 {
        self.max_calls_per_window
    }

    /// Returns the length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }
}
