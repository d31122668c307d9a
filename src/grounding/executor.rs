//! Grounded query execution against the model provider.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gemini::{
    Content, GeminiClientTrait, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, GroundingMetadata, Tool,
};

use super::error::QueryError;
use super::types::{Citation, GroundedResult, Query};

/// Instruction sent with every request unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, factual, and concise research assistant. Summarize findings in bullet points unless otherwise instructed.";

/// Sampling temperature used unless overridden.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Longest accepted query, in characters.
pub const DEFAULT_MAX_QUERY_CHARS: usize = 8000;

/// Errors raised when an executor is built with bad settings.
#[derive(Debug, Error, PartialEq)]
pub enum ExecutorError {
    /// No provider client was supplied
    #[error("a provider client must be set via client()")]
    MissingClient,

    /// Temperature outside 0.0..=1.0
    #[error("temperature must be between 0.0 and 1.0, got {0}")]
    InvalidTemperature(f64),

    /// A zero maximum query length would reject every query
    #[error("maximum query length must be at least 1")]
    ZeroMaxQueryLength,
}

/// Builder for constructing `GroundedQueryExecutor` instances.
pub struct GroundedQueryExecutorBuilder {
    client: Option<Arc<dyn GeminiClientTrait>>,
    system_prompt: String,
    temperature: f64,
    grounding: bool,
    max_query_chars: usize,
}

impl Default for GroundedQueryExecutorBuilder {
    fn default() -> Self {
        Self {
            client: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            grounding: true,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
        }
    }
}

impl GroundedQueryExecutorBuilder {
    /// Creates a new builder with default settings and grounding enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the provider client to use.
    pub fn client(mut self, client: Arc<dyn GeminiClientTrait>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the system instruction.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the sampling temperature (0.0 to 1.0).
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enables or disables Google Search grounding.
    pub fn grounding(mut self, enabled: bool) -> Self {
        self.grounding = enabled;
        self
    }

    /// Sets the maximum query length in characters.
    pub fn max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    /// Builds the `GroundedQueryExecutor`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if no client was set, the temperature is out of
    /// range, or the maximum query length is zero.
    pub fn build(self) -> Result<GroundedQueryExecutor, ExecutorError> {
        let client = self.client.ok_or(ExecutorError::MissingClient)?;
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ExecutorError::InvalidTemperature(self.temperature));
        }
        if self.max_query_chars == 0 {
            return Err(ExecutorError::ZeroMaxQueryLength);
        }

        Ok(GroundedQueryExecutor {
            client,
            system_prompt: self.system_prompt,
            temperature: self.temperature,
            grounding: self.grounding,
            max_query_chars: self.max_query_chars,
        })
    }
}

/// Turns admitted queries into grounded answers.
///
/// The executor never checks admission itself; callers must obtain
/// `Admission::Admitted` first. Each `run` makes at most one provider call and
/// never retries.
pub struct GroundedQueryExecutor {
    client: Arc<dyn GeminiClientTrait>,
    system_prompt: String,
    temperature: f64,
    grounding: bool,
    max_query_chars: usize,
}

impl GroundedQueryExecutor {
    /// Returns true if requests ask the provider for web grounding.
    pub fn grounding(&self) -> bool {
        self.grounding
    }

    /// Returns the maximum accepted query length in characters.
    pub fn max_query_chars(&self) -> usize {
        self.max_query_chars
    }

    /// Runs one grounded query.
    ///
    /// Empty or over-length queries are rejected with `QueryError::InvalidQuery`
    /// before any network call.
    ///
    /// # Errors
    ///
    /// Returns a classified `QueryError` for validation failures, provider
    /// errors, and responses that cannot be turned into a `GroundedResult`.
    pub fn run(&self, query: &str) -> Result<GroundedResult, QueryError> {
        let query = Query::parse(query, self.max_query_chars)?;
        let request = self.build_request(&query);

        let body = self.client.generate(&request).map_err(|e| {
            let classified = QueryError::from(e);
            warn!(error = %classified, "Grounded query failed");
            classified
        })?;

        let result = normalize_response(body)?;
        info!(
            citations = result.citations().len(),
            grounded = self.grounding,
            "Grounded query completed"
        );
        Ok(result)
    }

    /// Builds the outbound request for a validated query.
    pub fn build_request(&self, query: &Query) -> GenerateContentRequest {
        let mut request = GenerateContentRequest::from_prompt(query.as_str());
        if !self.system_prompt.trim().is_empty() {
            request.system_instruction = Some(Content::instruction(self.system_prompt.as_str()));
        }
        request.generation_config = Some(GenerationConfig {
            temperature: self.temperature,
        });
        if self.grounding {
            request.tools.push(Tool::google_search());
        }
        request
    }
}

/// Converts a raw provider body into a `GroundedResult`.
fn normalize_response(body: serde_json::Value) -> Result<GroundedResult, QueryError> {
    let response: GenerateContentResponse = serde_json::from_value(body)
        .map_err(|e| QueryError::MalformedResponse(format!("unexpected response shape: {e}")))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .map(|reason| format!("prompt was blocked ({reason})"))
            .unwrap_or_else(|| "response contained no candidates".to_string());
        return Err(QueryError::MalformedResponse(reason));
    };

    let answer_text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if answer_text.trim().is_empty() {
        let reason = match candidate.finish_reason {
            Some(finish) => format!("candidate contained no answer text (finish reason {finish})"),
            None => "candidate contained no answer text".to_string(),
        };
        return Err(QueryError::MalformedResponse(reason));
    }

    let metadata = candidate.grounding_metadata.unwrap_or_default();
    let citations = extract_citations(metadata);
    debug!(citations = citations.len(), "Normalized grounded response");

    Ok(GroundedResult::new(answer_text, citations))
}

/// Extracts web citations in the order the provider listed them.
///
/// Sources without a URI are skipped. A missing title falls back to the URI's host.
fn extract_citations(metadata: GroundingMetadata) -> Vec<Citation> {
    let sources = if metadata.grounding_chunks.is_empty() {
        metadata.grounding_attributions
    } else {
        metadata.grounding_chunks
    };

    sources
        .into_iter()
        .filter_map(|chunk| {
            let web = chunk.web?;
            let uri = web.uri.filter(|uri| !uri.trim().is_empty())?;
            let title = match web.title.filter(|title| !title.trim().is_empty()) {
                Some(title) => title,
                None => reqwest::Url::parse(&uri)
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_string))
                    .unwrap_or_else(|| uri.clone()),
            };
            Some(Citation::new(uri, title))
        })
        .collect()
}
