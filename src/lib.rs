pub mod admission;
pub mod config;
pub mod gemini;
pub mod grounding;
pub mod service;

pub use admission::{
    Admission, AdmissionController, RateLimitPolicy, Session, SessionId, SessionRegistry,
};
pub use config::AppConfig;
pub use gemini::{GeminiClient, GeminiClientBuilder, GeminiClientTrait, GeminiError};
pub use grounding::{
    Citation, GroundedQueryExecutor, GroundedQueryExecutorBuilder, GroundedResult, QueryError,
};
pub use service::SearchService;
