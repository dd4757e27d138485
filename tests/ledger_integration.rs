//! Cache and spend-gate behavior seen through the engine.

mod common;

use funnel::{
    IncentiveFilter, InMemoryStore, InMemoryVectorIndex, Incentive, MatchingEngine,
    MockEmbeddingProvider, MockLlmProvider, OperationKind, TokenUsage,
};

use common::*;

fn pick_a() -> String {
    selections(&[selection(COMPANY_A, 0.9, &["Software developer"])])
}

#[tokio::test]
async fn test_identical_run_is_served_from_cache() -> anyhow::Result<()> {
    init_tracing();
    let llm = MockLlmProvider::replying(pick_a()).with_usage(TokenUsage::new(800, 120));
    let engine = engine(llm, [company_a(), company_b()], 2, 1);

    let first = engine.match_incentive(INCENTIVE).await?;
    let second = engine.match_incentive(INCENTIVE).await?;

    assert_eq!(engine.llm().call_count(), 1);
    assert_eq!(first.matches, second.matches);

    let records: Vec<_> = engine
        .ledger()
        .records()
        .into_iter()
        .filter(|r| r.kind == OperationKind::BatchMatch)
        .collect();
    assert_eq!(records.len(), 2);
    assert!(!records[0].cache_hit);
    assert!(records[0].cost_usd > 0.0);
    assert!(records[1].cache_hit);
    assert_eq!(records[1].cost_usd, 0.0);
    assert_eq!(records[1].input_tokens, 0);

    assert_eq!(second.diagnostics.cache_hits, 1);
    assert_eq!(second.diagnostics.run_spend_usd, 0.0);
    assert_ne!(first.diagnostics.run_id, second.diagnostics.run_id);
    Ok(())
}

#[tokio::test]
async fn test_identical_prompts_share_entry_across_incentives() -> anyhow::Result<()> {
    init_tracing();
    let twin = Incentive {
        id: uuid::Uuid::from_u128(2),
        ..digital_incentive()
    };
    let store = InMemoryStore::new()
        .with_incentives([digital_incentive(), twin])
        .with_companies([company_a(), company_b()]);
    let engine = MatchingEngine::new(
        MockEmbeddingProvider::new(DIM),
        MockLlmProvider::replying(pick_a()),
        InMemoryVectorIndex::new(DIM),
        store,
    )
    .with_ledger(ledger(None))
    .with_settings(settings(2, 1));

    let summary = engine.match_all(&IncentiveFilter::default()).await?;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(engine.llm().call_count(), 1);
    assert_eq!(engine.ledger().stats().cache_hits, 1);
    Ok(())
}

#[tokio::test]
async fn test_indexing_stops_paying_at_ceiling() -> anyhow::Result<()> {
    init_tracing();
    // mock-embedding is priced as gpt-4o-mini: 0.0015 per call.
    let embedder = MockEmbeddingProvider::new(DIM).with_tokens_per_call(10_000);
    let companies: Vec<_> = (0..5u128)
        .map(|n| funnel::Company::new(uuid::Uuid::from_u128(500 + n), format!("Company {n}")))
        .collect();
    let store = InMemoryStore::new().with_companies(companies);
    let engine = MatchingEngine::new(
        embedder,
        MockLlmProvider::new(),
        InMemoryVectorIndex::new(DIM),
        store,
    )
    .with_ledger(ledger(Some(0.004)))
    .with_settings(settings(2, 1));

    let report = engine.index_companies().await?;

    assert_eq!(engine.embedder().call_count(), 3);
    assert_eq!(report.indexed, 3);
    assert_eq!(report.failed, 2);
    assert!(engine.ledger().is_budget_exhausted());

    let refused = engine
        .ledger()
        .records()
        .into_iter()
        .filter(|r| !r.success)
        .count();
    assert_eq!(refused, 0, "refused calls never reach the provider or the ledger");
    Ok(())
}

#[tokio::test]
async fn test_cache_hits_are_served_after_ceiling() -> anyhow::Result<()> {
    init_tracing();
    let llm = MockLlmProvider::replying(pick_a()).with_usage(TokenUsage::new(1_000, 1_000));
    let store = InMemoryStore::new()
        .with_incentives([digital_incentive()])
        .with_companies([company_a(), company_b()]);
    let engine = MatchingEngine::new(
        MockEmbeddingProvider::new(DIM),
        llm,
        InMemoryVectorIndex::new(DIM),
        store,
    )
    .with_ledger(ledger(Some(0.0005)))
    .with_settings(settings(2, 1));

    let first = engine.match_incentive(INCENTIVE).await?;
    assert!(!first.diagnostics.used_llm_fallback());
    assert!(engine.ledger().is_budget_exhausted());

    let second = engine.match_incentive(INCENTIVE).await?;
    assert!(!second.diagnostics.used_llm_fallback());
    assert_eq!(second.diagnostics.cache_hits, 1);
    assert_eq!(engine.llm().call_count(), 1);
    Ok(())
}
