//! Grounded query execution.
//!
//! This module turns an admitted query into a `GroundedResult` by sending a
//! single web-grounded request to the model provider, and classifies every
//! failure into a `QueryError` the caller can act on.

mod error;
mod executor;
mod types;

pub use error::QueryError;
pub use executor::{
    DEFAULT_MAX_QUERY_CHARS, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, ExecutorError,
    GroundedQueryExecutor, GroundedQueryExecutorBuilder,
};
pub use types::{Citation, GroundedResult, Query};
