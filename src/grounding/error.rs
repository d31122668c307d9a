//! Classified failures for a grounded query.

use thiserror::Error;
use time::Duration;

use crate::gemini::GeminiError;

/// Every way a grounded query can fail.
///
/// `RateLimited` and `InvalidQuery` are decided locally before any network
/// call. The rest come from the provider call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// The session used up its calls for the current window
    #[error("Rate limited: retry in {}s", ceil_seconds(.retry_after))]
    RateLimited { retry_after: Duration },

    /// The query was empty or too long
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The credential was missing or rejected
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The provider reported its own quota as exhausted
    #[error("Provider quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Connection failure, timeout or provider-side 5xx
    #[error("Network error: {0}")]
    TransientNetworkError(String),

    /// The provider answered with something that is not a grounded answer
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The provider refused the request for another reason
    #[error("Request rejected (status {status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// The client is set up with an unusable endpoint
    #[error("Client misconfigured: {0}")]
    ConfigurationError(String),
}

impl QueryError {
    /// Returns true if retrying the same query later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::RateLimited { .. }
                | QueryError::QuotaExceeded(_)
                | QueryError::TransientNetworkError(_)
        )
    }
}

impl From<GeminiError> for QueryError {
    fn from(error: GeminiError) -> Self {
        match error {
            GeminiError::MissingApiKey => {
                QueryError::AuthError("no API key configured".to_string())
            }
            GeminiError::Network(_) | GeminiError::Timeout(_) => {
                QueryError::TransientNetworkError(error.to_string())
            }
            GeminiError::InvalidUrl(message) => QueryError::ConfigurationError(message),
            GeminiError::Serialization(e) => {
                QueryError::MalformedResponse(format!("response body is not valid JSON: {e}"))
            }
            GeminiError::Api {
                status,
                provider_status,
                reasons,
                message,
            } => classify_status(status, provider_status.as_deref(), &reasons, message),
            GeminiError::Http { status, body } => classify_status(status, None, &[], body),
        }
    }
}

fn classify_status(
    status: u16,
    provider_status: Option<&str>,
    reasons: &[String],
    message: String,
) -> QueryError {
    let key_rejected = reasons.iter().any(|r| r.starts_with("API_KEY"))
        || matches!(provider_status, Some("UNAUTHENTICATED" | "PERMISSION_DENIED"));

    match status {
        401 | 403 => QueryError::AuthError(message),
        400 if key_rejected => QueryError::AuthError(message),
        429 => QueryError::QuotaExceeded(message),
        _ if provider_status == Some("RESOURCE_EXHAUSTED") => QueryError::QuotaExceeded(message),
        500..=599 => QueryError::TransientNetworkError(format!("status {status}: {message}")),
        _ => QueryError::ProviderRejected { status, message },
    }
}

/// Whole seconds until retry, rounded up so "retry in 0s" is never shown early.
fn ceil_seconds(duration: &Duration) -> i64 {
    let whole = duration.whole_seconds();
    if duration.subsec_nanoseconds() > 0 {
        whole + 1
    } else {
        whole
    }
}
