/// Gemini HTTP client module.
///
/// This module provides a blocking HTTP client for the Gemini `generateContent`
/// endpoint, the request/response wire types, and the error type for failed
/// calls. The client makes exactly one attempt per call.
mod client;
mod wire;

pub use client::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient, GeminiClientBuilder, GeminiClientTrait,
    GeminiError,
};
pub use wire::{
    ApiErrorBody, ApiErrorEnvelope, Candidate, Content, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig, GoogleSearch, GroundingChunk, GroundingMetadata,
    Part, PromptFeedback, Tool, WebSource,
};
