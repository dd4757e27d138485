use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::embedding::MockEmbeddingProvider;
use crate::provider::{MockLlmProvider, MockReply};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(200),
        max_retries: 2,
        backoff: Duration::from_millis(1),
    }
}

fn ledger_with(ceiling: Option<f64>) -> InferenceLedger {
    InferenceLedger::new(LedgerConfig {
        spend_ceiling_usd: ceiling,
        retry: fast_retry(),
        ..LedgerConfig::default()
    })
}

fn batch_ctx() -> CallContext {
    CallContext::new(OperationKind::BatchMatch)
}

#[tokio::test]
async fn test_identical_request_is_billed_once() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::replying("[]").with_usage(TokenUsage::new(1_000, 500));
    let request = CompletionRequest::new("gpt-4o-mini", "pick five", 2000);

    let first = ledger.complete(&provider, &request, batch_ctx()).await.unwrap();
    let second = ledger.complete(&provider, &request, batch_ctx()).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(&*first.value, &*second.value);
    assert_eq!(provider.call_count(), 1);

    let records = ledger.records();
    assert_eq!(records.len(), 2);
    assert!(!records[0].cache_hit);
    assert!(records[0].cost_usd > 0.0);
    assert!(records[1].cache_hit);
    assert_eq!(records[1].cost_usd, 0.0);
    assert!(records.iter().all(|r| r.success));
}

#[tokio::test]
async fn test_cost_uses_price_table() {
    let ledger = ledger_with(None);
    let provider =
        MockLlmProvider::replying("ok").with_usage(TokenUsage::new(1_000_000, 1_000_000));
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    ledger.complete(&provider, &request, batch_ctx()).await.unwrap();

    // 0.15 input + 0.60 output per million tokens
    assert!((ledger.spent_usd() - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_different_incentives_share_cache_entry() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::replying("[]");
    let request = CompletionRequest::new("gpt-4o-mini", "same prompt", 100);

    let a = ledger.scope(uuid::Uuid::from_u128(1));
    let b = ledger.scope(uuid::Uuid::from_u128(2));

    assert!(!a.complete(&provider, &request).await.unwrap().cache_hit);
    assert!(b.complete(&provider, &request).await.unwrap().cache_hit);
    assert_eq!(provider.call_count(), 1);

    assert_eq!(a.records().len(), 1);
    assert_eq!(b.records().len(), 1);
    assert_eq!(b.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_concurrent_identical_requests_collapse() {
    let ledger = Arc::new(ledger_with(None));
    let provider = MockLlmProvider::replying("[]").with_delay(Duration::from_millis(30));
    let request = CompletionRequest::new("gpt-4o-mini", "racing", 100);

    let (a, b) = tokio::join!(
        ledger.complete(&provider, &request, batch_ctx()),
        ledger.complete(&provider, &request, batch_ctx()),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(provider.call_count(), 1);

    let stats = ledger.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn test_retry_then_success_records_failed_attempt() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::replying("fine")
        .with_script([MockReply::Fail(ProviderError::Transport("reset".into()))]);
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    let response = ledger.complete(&provider, &request, batch_ctx()).await.unwrap();

    assert_eq!(&*response.value, "fine");
    assert_eq!(provider.call_count(), 2);

    let records = ledger.records();
    assert_eq!(records.len(), 2);
    assert!(!records[0].success);
    assert!(records[0].error.as_deref().unwrap_or("").contains("reset"));
    assert_eq!(records[0].cost_usd, 0.0);
    assert!(records[1].success);
}

#[tokio::test]
async fn test_non_retryable_error_fails_fast() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::failing(ProviderError::Status {
        status: 400,
        message: "bad".into(),
    });
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    let err = ledger
        .complete(&provider, &request, batch_ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, InferenceError::Provider { attempts: 1, .. }));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::failing(ProviderError::RateLimited("slow".into()));
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    let err = ledger
        .complete(&provider, &request, batch_ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, InferenceError::Provider { attempts: 3, .. }));
    assert_eq!(provider.call_count(), 3);
    assert_eq!(ledger.stats().failures, 3);
}

#[tokio::test]
async fn test_stuck_call_times_out() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::replying("late").with_delay(Duration::from_secs(5));
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    let err = ledger
        .complete(&provider, &request, batch_ctx())
        .await
        .unwrap_err();

    assert!(matches!(
        err.provider_error(),
        Some(ProviderError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_failed_call_is_not_cached() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::replying("second time lucky")
        .with_script([MockReply::Fail(ProviderError::Malformed("garbage".into()))]);
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    assert!(ledger.complete(&provider, &request, batch_ctx()).await.is_err());
    let response = ledger.complete(&provider, &request, batch_ctx()).await.unwrap();

    assert!(!response.cache_hit);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_budget_gate_refuses_misses_but_serves_hits() {
    let ledger = ledger_with(Some(0.0005));
    let provider = MockLlmProvider::new()
        .with_responder(|req| Ok(format!("answer to {}", req.prompt)))
        .with_usage(TokenUsage::new(1_000, 1_000));

    let first = CompletionRequest::new("gpt-4o-mini", "one", 10);
    let second = CompletionRequest::new("gpt-4o-mini", "two", 10);

    // 1k in + 1k out on gpt-4o-mini costs $0.00075, past the ceiling.
    ledger.complete(&provider, &first, batch_ctx()).await.unwrap();
    assert!(ledger.is_budget_exhausted());

    let err = ledger
        .complete(&provider, &second, batch_ctx())
        .await
        .unwrap_err();
    assert!(err.is_budget());
    assert_eq!(provider.call_count(), 1);

    let replay = ledger.complete(&provider, &first, batch_ctx()).await.unwrap();
    assert!(replay.cache_hit);
}

#[tokio::test]
async fn test_reject_completion_evicts_and_preserves_raw() {
    let ledger = ledger_with(None);
    let provider = MockLlmProvider::replying("not json at all");
    let request = CompletionRequest::new("gpt-4o-mini", "p", 10);

    let response = ledger.complete(&provider, &request, batch_ctx()).await.unwrap();
    ledger
        .reject_completion(
            &response.key,
            &request.model,
            &response.value,
            "unparsable selection",
            batch_ctx(),
        )
        .await;

    let rejected = ledger.records().last().cloned().unwrap();
    assert!(!rejected.success);
    assert!(rejected.error.unwrap().contains("not json at all"));

    let again = ledger.complete(&provider, &request, batch_ctx()).await.unwrap();
    assert!(!again.cache_hit);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_embedding_cache_and_stats_by_kind() {
    let ledger = ledger_with(None);
    let embedder = MockEmbeddingProvider::new(8);
    let ctx = CallContext::new(OperationKind::CompanyEmbedding);

    let a = ledger.embed(&embedder, "Acme", ctx).await.unwrap();
    let b = ledger.embed(&embedder, "Acme", ctx).await.unwrap();

    assert_eq!(a.value, b.value);
    assert_eq!(embedder.call_count(), 1);

    let stats = ledger.stats();
    let company = stats.by_kind[&OperationKind::CompanyEmbedding];
    assert_eq!(company.calls, 2);
    assert_eq!(company.cache_hits, 1);
    assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
}

#[test]
fn test_price_table_fallback() {
    let prices = PriceTable::default();
    let usage = TokenUsage::new(1_000_000, 0);

    assert!((prices.cost("gpt-4o", usage) - 2.50).abs() < 1e-9);
    assert!((prices.cost("some-new-model", usage) - 0.15).abs() < 1e-9);
    assert_eq!(PriceTable::empty("none").cost("x", usage), 0.0);
}
