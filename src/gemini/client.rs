/// Gemini HTTP client implementation.
///
/// This module provides `GeminiClient` for making synchronous HTTP requests to the
/// Gemini API, along with error types and a builder for configuration.
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::wire::{ApiErrorEnvelope, GenerateContentRequest};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// API root used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Errors that can occur when calling the Gemini API.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// No API key was supplied to the client
    #[error("API key is missing")]
    MissingApiKey,

    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// Non-success status whose body carried a provider error object
    #[error("Gemini API error (status {status}): {message}")]
    Api {
        status: u16,
        /// Canonical status name such as `RESOURCE_EXHAUSTED`
        provider_status: Option<String>,
        /// Machine-readable reasons from the error details, such as `API_KEY_INVALID`
        reasons: Vec<String>,
        message: String,
    },

    /// Non-success status without a parseable error body
    #[error("HTTP error: status {status}")]
    Http { status: u16, body: String },

    /// Success status whose body was not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl GeminiError {
    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GeminiError::Api { status, .. } | GeminiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds an error from a non-success status and its raw body.
    pub fn from_response(status: u16, body: String) -> Self {
        match serde_json::from_str::<ApiErrorEnvelope>(&body) {
            Ok(envelope) => {
                let reasons = envelope.error.reasons().map(str::to_string).collect();
                GeminiError::Api {
                    status,
                    provider_status: envelope.error.status,
                    reasons,
                    message: envelope.error.message,
                }
            }
            Err(_) => GeminiError::Http { status, body },
        }
    }
}

/// Builder for constructing `GeminiClient` instances.
///
/// # Examples
///
/// ```
/// use gsearch::gemini::GeminiClientBuilder;
///
/// let client = GeminiClientBuilder::new()
///     .api_key("test-key")
///     .model("gemini-2.5-flash")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.model(), "gemini-2.5-flash");
/// ```
#[derive(Default)]
pub struct GeminiClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiClientBuilder {
    /// Creates a new `GeminiClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API root (e.g. "https://generativelanguage.googleapis.com/v1beta").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name (e.g. "gemini-2.5-flash").
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the whole-request timeout. Defaults to 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `GeminiClient` with the configured settings.
    ///
    /// A missing API key is not an error here; calls made without one fail with
    /// `GeminiError::MissingApiKey` before touching the network.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::InvalidUrl` if the base URL does not parse, or
    /// `GeminiError::Network` if the HTTP client cannot be created.
    pub fn build(self) -> Result<GeminiClient, GeminiError> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key = self.api_key.filter(|key| !key.trim().is_empty());

        reqwest::Url::parse(&base_url)
            .map_err(|e| GeminiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(GeminiError::Network)?;

        Ok(GeminiClient {
            client,
            base_url,
            model,
            api_key,
        })
    }
}

/// Synchronous HTTP client for the Gemini `generateContent` endpoint.
///
/// It should be constructed using `GeminiClientBuilder`.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Trait for the remote grounding provider.
///
/// This trait enables stub providers in unit tests and keeps the rest of the
/// crate independent of HTTP details.
pub trait GeminiClientTrait: Send + Sync {
    /// Sends one `generateContent` request.
    ///
    /// # Returns
    ///
    /// The raw JSON body of a successful response, or the error that stopped the call.
    fn generate(&self, request: &GenerateContentRequest)
    -> Result<serde_json::Value, GeminiError>;
}

impl GeminiClient {
    /// Returns the API root configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the model name configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns true if an API key was supplied.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Returns the full `generateContent` endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn generate_internal(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<serde_json::Value, GeminiError> {
        let api_key = self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        let url = self.endpoint();

        debug!(model = %self.model, grounded = request.is_grounded(), "Sending generateContent request");

        // The key goes in a header so it never shows up in logged URLs.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().map_err(map_transport_error)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Gemini API returned an error status");
            return Err(GeminiError::from_response(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(GeminiError::Serialization)
    }
}

impl GeminiClientTrait for GeminiClient {
    fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<serde_json::Value, GeminiError> {
        self.generate_internal(request)
    }
}

fn map_transport_error(error: reqwest::Error) -> GeminiError {
    if error.is_timeout() {
        GeminiError::Timeout(error)
    } else {
        GeminiError::Network(error)
    }
}
