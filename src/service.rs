use time::OffsetDateTime;
use tracing::info;

use crate::admission::{Admission, SessionId, SessionRegistry};
use crate::grounding::{GroundedQueryExecutor, GroundedResult, QueryError};

/// Service layer composing admission control and grounded execution.
///
/// SearchService owns the session registry and the executor, and is the single
/// entry point a UI or CLI needs: it asks for admission first and only then
/// runs the query. It renders nothing and persists nothing.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use gsearch::admission::{AdmissionController, RateLimitPolicy, SessionRegistry};
/// use gsearch::gemini::GeminiClientBuilder;
/// use gsearch::grounding::GroundedQueryExecutorBuilder;
/// use gsearch::SearchService;
///
/// # fn main() -> anyhow::Result<()> {
/// let policy = RateLimitPolicy::new(5, time::Duration::seconds(60))?;
/// let registry = SessionRegistry::new(AdmissionController::new(policy));
/// let client = GeminiClientBuilder::new().api_key("key").build()?;
/// let executor = GroundedQueryExecutorBuilder::new().client(Arc::new(client)).build()?;
/// let service = SearchService::new(registry, executor);
/// # let _ = service;
/// # Ok(())
/// # }
/// ```
pub struct SearchService {
    registry: SessionRegistry,
    executor: GroundedQueryExecutor,
}

impl SearchService {
    /// Creates a service from a registry and an executor.
    pub fn new(registry: SessionRegistry, executor: GroundedQueryExecutor) -> Self {
        Self { registry, executor }
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Admits and runs one query for `session` at the current time.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::RateLimited` without any network call if the session
    /// is over its limit, otherwise whatever `GroundedQueryExecutor::run` returns.
    pub fn search(&self, session: &SessionId, query: &str) -> Result<GroundedResult, QueryError> {
        self.search_at(session, query, OffsetDateTime::now_utc())
    }

    /// Admits and runs one query for `session` at instant `now`.
    ///
    /// # Errors
    ///
    /// See `search`.
    pub fn search_at(
        &self,
        session: &SessionId,
        query: &str,
        now: OffsetDateTime,
    ) -> Result<GroundedResult, QueryError> {
        match self.registry.acquire(session, now) {
            Admission::Admitted => self.executor.run(query),
            Admission::Denied { retry_after } => {
                info!(session = %session, retry_after_secs = retry_after.whole_seconds(), "Query rate limited");
                Err(QueryError::RateLimited { retry_after })
            }
        }
    }
}
