//! Router integration tests.
//!
//! End-to-end scenarios over the full facade: strategy ordering, context
//! escalation, budget gating, rate-limit timeouts, and error aggregation.
//! Time-sensitive tests run under tokio's paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use model_router::backend::testing::StaticBackend;
use model_router::{
    BudgetConfig, BudgetPeriod, Error, FailureReason, FallbackEvent, FallbackReason,
    FallbackStrategyKind, ModelLimits, PricingTable, Router, Usage,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "model_router=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn limits(model: &str, rpm: u64, max_context: u64) -> ModelLimits {
    ModelLimits::new("test", model, rpm, 10_000_000, max_context)
}

fn succeeding(model: &str, rpm: u64, max_context: u64) -> Arc<StaticBackend> {
    Arc::new(StaticBackend::succeeding(limits(model, rpm, max_context)))
}

fn failing(model: &str, message: &str) -> Arc<StaticBackend> {
    Arc::new(StaticBackend::failing(limits(model, 500, 200_000), message))
}

fn collect_events() -> (
    Arc<Mutex<Vec<FallbackEvent>>>,
    impl Fn(&FallbackEvent) + Send + Sync + 'static,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event: &FallbackEvent| {
        sink.lock().unwrap().push(event.clone());
    })
}

// =============================================================================
// Fallback chain
// =============================================================================

mod fallback_chain {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failing_primary_falls_back_exactly_once_each() {
        super::init_tracing();
        let a = failing("model-a", "upstream error");
        let b = succeeding("model-b", 500, 200_000);
        let (events, hook) = collect_events();

        let router = Router::builder()
            .with_primary(a.clone())
            .with_fallback(b.clone())
            .on_fallback(hook)
            .build()
            .unwrap();

        let response = router.invoke("hello").await.unwrap();
        assert_eq!(response.text, "model-b response");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attempted_model, "model-a");
        assert_eq!(events[0].fallback_model, "model-b");
        assert_eq!(events[0].reason, FallbackReason::InvocationFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failing_aggregates_reasons_in_order() {
        let a = failing("model-a", "first down");
        let b = failing("model-b", "second down");

        let router = Router::builder()
            .with_primary(a.clone())
            .with_fallback(b.clone())
            .build()
            .unwrap();

        let err = router.invoke("hello").await.unwrap_err();
        let failures = err.failures().expect("exhaustion error");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].model, "model-a");
        assert_eq!(failures[1].model, "model-b");
        assert!(matches!(
            failures[0].reason,
            FailureReason::Invocation { .. }
        ));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success_emits_no_event() {
        let a = succeeding("model-a", 500, 200_000);
        let (events, hook) = collect_events();

        let router = Router::builder()
            .with_primary(a.clone())
            .with_fallback(succeeding("model-b", 500, 200_000))
            .on_fallback(hook)
            .build()
            .unwrap();

        router.invoke("hello").await.unwrap();
        assert_eq!(a.calls(), 1);
        assert!(events.lock().unwrap().is_empty());
    }
}

// =============================================================================
// Context escalation
// =============================================================================

mod context_escalation {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_oversized_payload_escalates_to_larger_window() {
        super::init_tracing();
        let small = succeeding("small", 500, 128_000);
        let large = succeeding("large", 500, 2_097_152);
        let (events, hook) = collect_events();

        let router = Router::builder()
            .with_primary(small.clone())
            .with_fallback(large.clone())
            .on_fallback(hook)
            .build()
            .unwrap();

        // 600k chars / 4 = 150k tokens: over the primary, fits the fallback.
        let payload = "x".repeat(600_000);
        let response = router.invoke(&payload).await.unwrap();
        assert_eq!(response.text, "large response");
        assert_eq!(small.calls(), 0);
        assert_eq!(large.calls(), 1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, FallbackReason::ContextTooLarge);
        assert_eq!(events[0].estimated_tokens, 150_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_beyond_every_window_errors_with_best_available() {
        let small = succeeding("small", 500, 128_000);
        let large = succeeding("large", 500, 2_097_152);

        let router = Router::builder()
            .with_primary(small.clone())
            .with_fallback(large.clone())
            .build()
            .unwrap();

        // 12M chars / 4 = 3M tokens: over both windows.
        let payload = "x".repeat(12_000_000);
        let err = router.invoke(&payload).await.unwrap_err();
        match err {
            Error::ContextTooLarge {
                estimated_tokens,
                max_context,
            } => {
                assert_eq!(estimated_tokens, 3_000_000);
                assert_eq!(max_context, 2_097_152);
            }
            other => panic!("expected ContextTooLarge, got {other}"),
        }
        assert_eq!(small.calls(), 0);
        assert_eq!(large.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_fallback_disabled_still_reports_context_error() {
        let router = Router::builder()
            .with_primary(succeeding("small", 500, 128_000))
            .with_context_fallback(false)
            .build()
            .unwrap();

        let err = router.invoke(&"x".repeat(600_000)).await.unwrap_err();
        assert!(err.is_context_too_large());
    }
}

// =============================================================================
// Rate limiting
// =============================================================================

mod rate_limiting {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_back_to_back_call_times_out() {
        let a = succeeding("model-a", 1, 200_000);

        let router = Router::builder()
            .with_primary(a.clone())
            .with_safety_margin(0)
            .with_max_wait(Duration::ZERO)
            .build()
            .unwrap();

        router.invoke("first").await.unwrap();
        let err = router.invoke("second").await.unwrap_err();

        let failures = err.failures().expect("exhaustion error");
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].reason,
            FailureReason::RateLimitTimeout { .. }
        ));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_primary_falls_back() {
        let a = succeeding("model-a", 1, 200_000);
        let b = succeeding("model-b", 500, 200_000);
        let (events, hook) = collect_events();

        let router = Router::builder()
            .with_primary(a.clone())
            .with_fallback(b.clone())
            .with_safety_margin(0)
            .with_max_wait(Duration::ZERO)
            .on_fallback(hook)
            .build()
            .unwrap();

        router.invoke("first").await.unwrap();
        let response = router.invoke("second").await.unwrap();
        assert_eq!(response.text, "model-b response");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);

        let events = events.lock().unwrap();
        assert_eq!(events[0].reason, FallbackReason::RateLimitTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_clears_after_window_drains() {
        let a = succeeding("model-a", 1, 200_000);

        let router = Router::builder()
            .with_primary(a.clone())
            .with_safety_margin(0)
            .with_max_wait(Duration::from_secs(120))
            .build()
            .unwrap();

        // Paused clock: the second call sleeps through the 60s spacing
        // inside wait_until_ready instead of timing out.
        router.invoke("first").await.unwrap();
        router.invoke("second").await.unwrap();
        assert_eq!(a.calls(), 2);
    }
}

// =============================================================================
// Budgets
// =============================================================================

mod budgets {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_all_candidates_budget_blocked_surfaces_budget_error() {
        let router = Router::builder()
            .with_primary(succeeding("model-a", 500, 200_000))
            .with_fallback(succeeding("model-b", 500, 200_000))
            .with_budget(BudgetConfig::new(BudgetPeriod::Daily, 1.0))
            .build()
            .unwrap();

        // Spend past the hard limit out of band; the overage error here is
        // expected and irrelevant.
        let _ = router.budget().record_cost(5.0, None);

        let err = router.invoke("hello").await.unwrap_err();
        match err {
            Error::BudgetExceeded { period, .. } => assert_eq!(period, BudgetPeriod::Daily),
            other => panic!("expected BudgetExceeded, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_call_may_overrun_then_blocks_next() {
        let expensive = Arc::new(
            StaticBackend::succeeding(limits("model-a", 500, 200_000))
                .with_usage(Usage::new(1_000_000, 500_000)),
        );

        let router = Router::builder()
            .with_primary(expensive.clone())
            .with_budget(BudgetConfig::new(BudgetPeriod::Total, 10.0))
            .build()
            .unwrap();

        // Default pricing 3/15 per Mtok: this call costs $10.50. The
        // response still comes back; the overage is only logged.
        router.invoke("hello").await.unwrap();
        assert_eq!(expensive.calls(), 1);

        let err = router.invoke("again").await.unwrap_err();
        assert!(err.is_budget_exceeded());
        assert_eq!(expensive.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_budget_never_blocks() {
        let a = succeeding("model-a", 500, 200_000);

        let router = Router::builder()
            .with_primary(a.clone())
            .with_budget(BudgetConfig::new(BudgetPeriod::Daily, 0.0001).soft())
            .build()
            .unwrap();

        router.invoke("one").await.unwrap();
        router.invoke("two").await.unwrap();
        assert_eq!(a.calls(), 2);
    }
}

// =============================================================================
// Strategies
// =============================================================================

mod strategies {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cost_optimized_prefers_cheaper_backend() {
        let opus = succeeding("opus", 500, 200_000);
        let haiku = succeeding("haiku", 500, 200_000);
        let (events, hook) = collect_events();

        let router = Router::builder()
            .with_primary(opus.clone())
            .with_fallback(haiku.clone())
            .with_fallback_strategy(FallbackStrategyKind::CostOptimized)
            .with_pricing(
                PricingTable::builder()
                    .model_base("opus", 15.0, 75.0)
                    .model_base("haiku", 0.8, 4.0)
                    .build(),
            )
            .on_fallback(hook)
            .build()
            .unwrap();

        let response = router.invoke("hello").await.unwrap();
        assert_eq!(response.text, "haiku response");
        assert_eq!(opus.calls(), 0);
        assert_eq!(haiku.calls(), 1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, FallbackReason::StrategyPreference);
    }

    #[tokio::test(start_paused = true)]
    async fn test_smart_routes_around_unhealthy_primary() {
        let flaky = failing("flaky", "down");
        let steady = succeeding("steady", 500, 200_000);

        let router = Router::builder()
            .with_primary(flaky.clone())
            .with_fallback(steady.clone())
            .with_fallback_strategy(FallbackStrategyKind::Smart)
            .build()
            .unwrap();

        // First call: no history, configured order holds, flaky fails and
        // the router recovers through steady.
        router.invoke("one").await.unwrap();
        assert_eq!(flaky.calls(), 1);

        // With the failure on record, Smart stops leading with flaky.
        router.invoke("two").await.unwrap();
        assert_eq!(flaky.calls(), 1);
        assert_eq!(steady.calls(), 2);
    }
}

// =============================================================================
// Introspection
// =============================================================================

mod introspection {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_usage_and_budget() {
        let router = Router::builder()
            .with_primary(succeeding("model-a", 500, 200_000))
            .with_fallback(succeeding("model-b", 500, 200_000))
            .with_budget(BudgetConfig::new(BudgetPeriod::Daily, 50.0))
            .build()
            .unwrap();

        router.invoke("hello").await.unwrap();

        let status = router.status();
        assert_eq!(status.backends.len(), 2);
        assert_eq!(status.backends[0].model_name, "model-a");
        assert_eq!(status.backends[0].requests_in_window, 1);
        assert!(status.backends[0].tokens_in_window > 0);
        assert_eq!(status.backends[1].requests_in_window, 0);

        let daily = &status.budget[&BudgetPeriod::Daily];
        assert!(daily.spent > 0.0);
        assert!(daily.remaining < 50.0);

        // Status is host-facing: it must serialize.
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("model-a"));
        assert!(json.contains("daily"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_drains_out_of_status() {
        let router = Router::builder()
            .with_primary(succeeding("model-a", 500, 200_000))
            .build()
            .unwrap();

        router.invoke("hello").await.unwrap();
        assert_eq!(router.status().backends[0].requests_in_window, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(router.status().backends[0].requests_in_window, 0);
    }
}
