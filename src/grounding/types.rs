//! Types for grounded query results.

use serde::Serialize;

use super::error::QueryError;

/// A validated, non-empty query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Validates `text` against a maximum length in characters.
    ///
    /// Surrounding whitespace is trimmed before both checks.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidQuery` if the trimmed text is empty or longer
    /// than `max_chars`.
    pub fn parse(text: &str, max_chars: usize) -> Result<Self, QueryError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(QueryError::InvalidQuery("query cannot be empty".to_string()));
        }

        let length = trimmed.chars().count();
        if length > max_chars {
            return Err(QueryError::InvalidQuery(format!(
                "query is {length} characters long, the limit is {max_chars}"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the query text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A web source the provider used to ground its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    source_url: String,
    source_title: String,
}

impl Citation {
    /// Creates a new citation.
    pub fn new(source_url: impl Into<String>, source_title: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            source_title: source_title.into(),
        }
    }

    /// Returns the source URL.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Returns the source title.
    pub fn source_title(&self) -> &str {
        &self.source_title
    }

    /// Returns the host part of the source URL, if it parses.
    pub fn domain(&self) -> Option<String> {
        reqwest::Url::parse(&self.source_url)
            .ok()?
            .host_str()
            .map(str::to_string)
    }
}

/// Answer text plus the citations backing it.
///
/// Citations keep the provider's relevance order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundedResult {
    answer_text: String,
    citations: Vec<Citation>,
}

impl GroundedResult {
    /// Creates a result.
    pub fn new(answer_text: String, citations: Vec<Citation>) -> Self {
        Self {
            answer_text,
            citations,
        }
    }

    /// Returns the answer text.
    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    /// Returns the citations in provider order.
    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }
}
