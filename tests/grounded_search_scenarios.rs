/// End-to-end scenarios through the public API: admission, execution and
/// error classification, with a stub provider standing in for Gemini.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use gsearch::gemini::{GeminiClientTrait, GeminiError, GenerateContentRequest};
use gsearch::{
    Admission, AdmissionController, Citation, GroundedQueryExecutorBuilder, QueryError,
    RateLimitPolicy, SearchService, Session, SessionId, SessionRegistry,
};
use serde_json::json;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const T0: OffsetDateTime = datetime!(2025-03-01 09:00:00 UTC);

/// Stub provider replaying one canned outcome and counting invocations.
struct StubProvider {
    outcome: Box<dyn Fn() -> Result<serde_json::Value, GeminiError> + Send + Sync>,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(
        outcome: impl Fn() -> Result<serde_json::Value, GeminiError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            outcome: Box::new(outcome),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeminiClientTrait for StubProvider {
    fn generate(
        &self,
        _request: &GenerateContentRequest,
    ) -> Result<serde_json::Value, GeminiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

fn paris_provider() -> Arc<StubProvider> {
    StubProvider::new(|| {
        Ok(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Paris is the capital of France."}]},
                "groundingMetadata": {
                    "groundingChunks": [{"web": {"uri": "https://a.example", "title": "A"}}]
                }
            }]
        }))
    })
}

fn search_service(policy: RateLimitPolicy, provider: Arc<StubProvider>) -> Result<SearchService> {
    let executor = GroundedQueryExecutorBuilder::new()
        .client(provider)
        .build()?;
    Ok(SearchService::new(
        SessionRegistry::new(AdmissionController::new(policy)),
        executor,
    ))
}

#[test]
fn three_per_minute_policy_scenario() -> Result<()> {
    let controller = AdmissionController::new(RateLimitPolicy::new(3, Duration::seconds(60))?);
    let mut session = Session::new(SessionId::from("browser-tab"));

    for t in 0..3 {
        assert_eq!(
            controller.try_acquire(&mut session, T0 + Duration::seconds(t)),
            Admission::Admitted
        );
    }
    assert_eq!(
        controller.try_acquire(&mut session, T0 + Duration::seconds(3)),
        Admission::Denied {
            retry_after: Duration::seconds(57)
        }
    );
    assert_eq!(
        controller.try_acquire(&mut session, T0 + Duration::seconds(61)),
        Admission::Admitted
    );

    Ok(())
}

#[test]
fn stub_answer_is_returned_verbatim() -> Result<()> {
    let provider = paris_provider();
    let service = search_service(RateLimitPolicy::new(3, Duration::seconds(60))?, provider.clone())?;

    let result = service.search_at(&SessionId::from("s"), "capital of France", T0)?;

    assert_eq!(result.answer_text(), "Paris is the capital of France.");
    assert_eq!(result.citations(), [Citation::new("https://a.example", "A")]);
    assert_eq!(provider.calls(), 1);
    Ok(())
}

#[test]
fn authentication_failure_yields_auth_error_and_no_result() -> Result<()> {
    let provider = StubProvider::new(|| {
        Err(GeminiError::Api {
            status: 403,
            provider_status: Some("PERMISSION_DENIED".to_string()),
            reasons: Vec::new(),
            message: "Method doesn't allow unregistered callers".to_string(),
        })
    });
    let service = search_service(RateLimitPolicy::new(3, Duration::seconds(60))?, provider)?;

    let result = service.search_at(&SessionId::from("s"), "capital of France", T0);

    assert!(matches!(result, Err(QueryError::AuthError(_))));
    Ok(())
}

#[test]
fn rate_limited_session_is_admitted_again_after_idle_window() -> Result<()> {
    let provider = paris_provider();
    let service = search_service(RateLimitPolicy::new(1, Duration::seconds(30))?, provider.clone())?;
    let session = SessionId::from("s");

    service.search_at(&session, "first", T0)?;
    let denied = service.search_at(&session, "second", T0 + Duration::seconds(10));
    assert_eq!(
        denied,
        Err(QueryError::RateLimited {
            retry_after: Duration::seconds(20)
        })
    );
    assert!(denied.unwrap_err().is_retryable());

    assert!(service.search_at(&session, "third", T0 + Duration::seconds(40)).is_ok());
    assert_eq!(provider.calls(), 2);
    Ok(())
}

#[test]
fn invalid_queries_make_no_provider_calls() -> Result<()> {
    let provider = paris_provider();
    let executor = GroundedQueryExecutorBuilder::new()
        .client(provider.clone())
        .max_query_chars(100)
        .build()?;

    assert!(matches!(executor.run(""), Err(QueryError::InvalidQuery(_))));
    assert!(matches!(
        executor.run(&"why ".repeat(26)),
        Err(QueryError::InvalidQuery(_))
    ));
    assert_eq!(provider.calls(), 0);
    Ok(())
}

#[test]
fn expired_sessions_are_evicted_from_registry() -> Result<()> {
    let registry = SessionRegistry::new(AdmissionController::new(RateLimitPolicy::new(
        2,
        Duration::seconds(60),
    )?));

    for id in ["a", "b", "c"] {
        registry.acquire(&SessionId::from(id), T0);
    }
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.evict_expired(T0 + Duration::seconds(60)), 3);
    assert!(registry.is_empty());
    Ok(())
}
