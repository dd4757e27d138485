use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::*;
use crate::embedding::MockEmbeddingProvider;
use crate::ledger::{InferenceCallRecord, LedgerConfig, RetryPolicy};
use crate::model::{IncentiveProfile, Match};
use crate::provider::{MockLlmProvider, ProviderError, TokenUsage};
use crate::store::{InMemoryStore, StoreError, StoreResult};
use crate::vectordb::InMemoryVectorIndex;

const DIM: usize = 8;

type TestEngine<S = InMemoryStore> =
    MatchingEngine<MockEmbeddingProvider, MockLlmProvider, InMemoryVectorIndex, S>;

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn software_profile() -> IncentiveProfile {
    IncentiveProfile {
        eligible_codes: ["62010".to_string(), "62020".to_string()].into_iter().collect(),
        eligible_sectors: vec!["Software".to_string()],
        ..Default::default()
    }
}

fn incentive(n: u128, title: &str) -> Incentive {
    Incentive::new(id(n), title).with_profile(software_profile())
}

fn company_a() -> Company {
    Company::new(id(10), "Acme")
        .with_code("62010")
        .with_sector("Software development")
}

fn company_b() -> Company {
    Company::new(id(11), "Bolt")
        .with_code("71100")
        .with_sector("Legal")
}

fn ledger(ceiling: Option<f64>) -> Arc<InferenceLedger> {
    Arc::new(InferenceLedger::new(LedgerConfig {
        spend_ceiling_usd: ceiling,
        retry: RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries: 0,
            backoff: Duration::from_millis(1),
        },
        ..LedgerConfig::default()
    }))
}

fn settings(k: usize, m: usize) -> FunnelSettings {
    FunnelSettings {
        llm_candidates: k,
        select_count: m,
        workers: 1,
        ..FunnelSettings::default()
    }
}

fn engine_with_store<S: MatchStore>(
    embedder: MockEmbeddingProvider,
    llm: MockLlmProvider,
    store: S,
    settings: FunnelSettings,
) -> TestEngine<S> {
    MatchingEngine::new(embedder, llm, InMemoryVectorIndex::new(DIM), store)
        .with_ledger(ledger(None))
        .with_settings(settings)
}

fn engine(llm: MockLlmProvider, k: usize, m: usize) -> TestEngine {
    let store = InMemoryStore::new()
        .with_incentives([incentive(1, "Digital Transition")])
        .with_companies([company_a(), company_b()]);
    engine_with_store(MockEmbeddingProvider::new(DIM), llm, store, settings(k, m))
}

fn pick(company: Uuid, score: f64, reason: &str) -> String {
    format!(r#"[{{"company_id":"{company}","score":{score},"reasons":["{reason}"]}}]"#)
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

// fusion and stages

#[test]
fn test_fusion_uses_all_weights() {
    let w = FusionWeights::default();
    let fused = w.fuse(Some(1.0), 0.5, Some(0.0));
    assert!((fused - (0.3 + 0.2)).abs() < 1e-6);
}

#[test]
fn test_fusion_renormalizes_without_semantic() {
    let w = FusionWeights::default();
    let fused = w.fuse(None, 1.0, Some(1.0));
    assert!((fused - 1.0).abs() < 1e-6);

    let det_only = w.fuse(None, 0.85, Some(0.0));
    assert!((det_only - 0.4 / 0.7 * 0.85).abs() < 1e-6);
}

#[test]
fn test_fusion_deterministic_alone() {
    let w = FusionWeights::default();
    assert!((w.fuse(None, 0.85, None) - 0.85).abs() < 1e-6);

    let zero = FusionWeights {
        semantic: 0.0,
        deterministic: 0.0,
        llm: 1.0,
    };
    assert_eq!(zero.fuse(None, 0.9, None), 0.0);
}

#[test]
fn test_stage_transitions() {
    use FunnelStage::*;

    assert!(Retrieve.can_advance_to(Score));
    assert!(Select.can_advance_to(ErrorFallback));
    assert!(ErrorFallback.can_advance_to(Merge));
    assert!(!Retrieve.can_advance_to(Select));
    assert!(!Done.can_advance_to(Retrieve));

    let mut path = StagePath::new();
    assert!(path.enter(Score));
    assert!(path.enter(Select));
    assert!(path.enter(ErrorFallback));
    assert!(path.enter(Merge));
    assert!(path.enter(Done));
    assert!(!path.enter(Score));
    assert_eq!(
        path.to_string(),
        "SCORE -> SELECT -> ERROR_FALLBACK -> MERGE -> DONE -> SCORE"
    );
}

#[test]
fn test_path_cannot_start_at_select() {
    let mut path = StagePath::new();
    assert!(!path.enter(FunnelStage::Select));
}

// match_incentive

#[tokio::test]
async fn test_llm_failure_keeps_deterministic_winner() {
    let engine = engine(
        MockLlmProvider::failing(ProviderError::Unavailable("down".into())),
        2,
        1,
    );

    let result = engine.match_incentive(id(1)).await.unwrap();

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].company_id, id(10));
    assert_eq!(result.matches[0].rank, 1);
    assert!((result.matches[0].score - 0.85).abs() < 1e-6);
    assert!(result.diagnostics.used_llm_fallback());
    assert!(result.diagnostics.is_degraded());
    assert!(
        result.matches[0]
            .reasons
            .iter()
            .any(|r| r.starts_with("Deterministic fallback"))
    );
}

#[tokio::test]
async fn test_model_preference_does_not_override_rules() {
    let llm = MockLlmProvider::replying(pick(id(11), 1.0, "Code 71100 is eligible"));
    let engine = engine(llm, 2, 1);

    let result = engine.match_incentive(id(1)).await.unwrap();

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].company_id, id(10));
    assert_eq!(result.diagnostics.contradicted, 1);
    assert!(!result.diagnostics.used_llm_fallback());
}

#[tokio::test]
async fn test_merged_reasons_put_model_first() {
    let llm = MockLlmProvider::replying(pick(id(10), 0.9, "Strong software focus"));
    let engine = engine(llm, 2, 1);

    let result = engine.match_incentive(id(1)).await.unwrap();
    let top = &result.matches[0];

    assert_eq!(top.company_id, id(10));
    assert_eq!(top.reasons[0], "Strong software focus");
    assert!(top.reasons.len() > 1);
}

#[tokio::test]
async fn test_empty_index_scores_full_population() {
    let reply = format!(
        r#"[{{"company_id":"{}","score":0.9}},{{"company_id":"{}","score":0.2}}]"#,
        id(10),
        id(11)
    );
    let engine = engine(MockLlmProvider::replying(reply), 2, 2);

    let result = engine.match_incentive(id(1)).await.unwrap();
    let diag = &result.diagnostics;

    assert_eq!(
        diag.path.stages(),
        &[
            FunnelStage::Score,
            FunnelStage::Select,
            FunnelStage::Merge,
            FunnelStage::Done
        ]
    );
    assert_eq!(diag.retrieved, 0);
    assert_eq!(diag.scored, 2);
    assert_eq!(diag.sent_to_llm, 2);
    assert_eq!(diag.selected, 2);
    assert!(diag.fallback_reasons[0].contains("vector index is empty"));
    assert_eq!(engine.embedder().call_count(), 0);
}

#[tokio::test]
async fn test_semantic_retrieval_narrows_population() {
    let a = company_a();
    let b = company_b();
    let incentive = incentive(1, "Digital Transition");

    let embedder = MockEmbeddingProvider::new(DIM)
        .with_vector(incentive_text(&incentive).unwrap(), unit(0))
        .with_vector(company_text(&a).unwrap(), unit(0))
        .with_vector(company_text(&b).unwrap(), unit(1));
    let store = InMemoryStore::new()
        .with_incentives([incentive])
        .with_companies([a, b]);
    let engine = engine_with_store(
        embedder,
        MockLlmProvider::replying(pick(id(10), 0.8, "fit")),
        store,
        settings(2, 2),
    );

    let report = engine.index_companies().await.unwrap();
    assert_eq!(report.indexed, 2);

    let result = engine.match_incentive(id(1)).await.unwrap();
    let diag = &result.diagnostics;

    assert!(diag.used_semantic_retrieval());
    assert_eq!(diag.path.stages()[0], FunnelStage::Retrieve);
    assert_eq!(diag.retrieved, 1);
    assert_eq!(diag.scored, 1);
    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].company_id, id(10));
    assert!(!diag.is_degraded());
}

#[tokio::test]
async fn test_rerun_replaces_previous_matches() {
    let engine = engine(MockLlmProvider::replying("not json"), 2, 2);

    let first = engine.match_incentive(id(1)).await.unwrap();
    assert_eq!(first.matches.len(), 2);

    engine.store().upsert_company(company_b().inactive());
    let second = engine.match_incentive(id(1)).await.unwrap();

    let stored: Vec<Match> = engine.store().matches_for(id(1)).await.unwrap();
    assert_eq!(stored, second.matches);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].company_id, id(10));
    assert_eq!(stored[0].rank, 1);
}

#[tokio::test]
async fn test_no_active_companies_persists_empty_set() {
    let store = InMemoryStore::new().with_incentives([incentive(1, "Digital Transition")]);
    let llm = MockLlmProvider::new();
    let engine = engine_with_store(MockEmbeddingProvider::new(DIM), llm, store, settings(2, 1));

    let result = engine.match_incentive(id(1)).await.unwrap();

    assert!(result.matches.is_empty());
    assert!(!result.diagnostics.path.contains(FunnelStage::Select));
    assert_eq!(engine.llm().call_count(), 0);
}

#[tokio::test]
async fn test_unknown_incentive() {
    let engine = engine(MockLlmProvider::new(), 2, 1);
    let err = engine.match_incentive(id(99)).await.unwrap_err();
    assert_eq!(err, MatchError::IncentiveNotFound(id(99)));
}

#[tokio::test]
async fn test_store_outage_propagates() {
    let engine = engine(MockLlmProvider::new(), 2, 1);
    engine.store().set_unavailable(true);

    let err = engine.match_incentive(id(1)).await.unwrap_err();
    assert!(matches!(err, MatchError::Store(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn test_run_records_are_persisted() {
    let engine = engine(MockLlmProvider::replying(pick(id(10), 0.9, "fit")), 2, 1);

    let result = engine.match_incentive(id(1)).await.unwrap();
    let records = engine.store().call_records();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].run_id, Some(result.diagnostics.run_id));
    assert_eq!(records[0].incentive_id, Some(id(1)));
    assert_eq!(result.diagnostics.provider_calls, 1);
}

// match_all

struct FlakyStore {
    inner: InMemoryStore,
    fail_for: IncentiveId,
}

#[async_trait]
impl MatchStore for FlakyStore {
    async fn get_incentive(&self, id: IncentiveId) -> StoreResult<Option<Incentive>> {
        self.inner.get_incentive(id).await
    }

    async fn list_incentives(&self) -> StoreResult<Vec<Incentive>> {
        self.inner.list_incentives().await
    }

    async fn list_active_companies(&self) -> StoreResult<Vec<Company>> {
        self.inner.list_active_companies().await
    }

    async fn replace_matches(
        &self,
        incentive_id: IncentiveId,
        matches: MatchSet,
    ) -> StoreResult<()> {
        if incentive_id == self.fail_for {
            return Err(StoreError::WriteFailed("disk full".into()));
        }
        self.inner.replace_matches(incentive_id, matches).await
    }

    async fn matches_for(&self, incentive_id: IncentiveId) -> StoreResult<Vec<Match>> {
        self.inner.matches_for(incentive_id).await
    }

    async fn append_call_records(&self, records: &[InferenceCallRecord]) -> StoreResult<()> {
        self.inner.append_call_records(records).await
    }
}

#[tokio::test]
async fn test_match_all_continues_past_failure() {
    let store = FlakyStore {
        inner: InMemoryStore::new()
            .with_incentives([
                incentive(1, "First"),
                incentive(2, "Second"),
                incentive(3, "Third"),
            ])
            .with_companies([company_a(), company_b()]),
        fail_for: id(2),
    };
    let engine = engine_with_store(
        MockEmbeddingProvider::new(DIM),
        MockLlmProvider::replying(pick(id(10), 0.9, "fit")),
        store,
        FunnelSettings {
            workers: 2,
            ..settings(2, 1)
        },
    );

    let summary = engine.match_all(&IncentiveFilter::default()).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].incentive_id, id(2));
    assert!(summary.failures[0].error.contains("disk full"));
    let ids: Vec<_> = summary.results.iter().map(|r| r.incentive_id).collect();
    assert_eq!(ids, vec![id(1), id(3)]);
}

#[tokio::test]
async fn test_match_all_filter_skips_unenriched() {
    let store = InMemoryStore::new()
        .with_incentives([
            incentive(1, "Enriched"),
            Incentive::new(id(2), "Raw"),
        ])
        .with_companies([company_a()]);
    let engine = engine_with_store(
        MockEmbeddingProvider::new(DIM),
        MockLlmProvider::new(),
        store,
        settings(2, 1),
    );

    let summary = engine.match_all(&IncentiveFilter::default()).await.unwrap();
    assert_eq!(summary.total, 1);

    let summary = engine.match_all(&IncentiveFilter::all()).await.unwrap();
    assert_eq!(summary.total, 2);
}

#[tokio::test]
async fn test_match_all_stops_at_spend_ceiling() {
    let store = InMemoryStore::new()
        .with_incentives([
            incentive(1, "First"),
            incentive(2, "Second"),
            incentive(3, "Third"),
        ])
        .with_companies([company_a(), company_b()]);
    let llm = MockLlmProvider::replying(pick(id(10), 0.9, "fit"))
        .with_usage(TokenUsage::new(1_000, 1_000));
    let engine = MatchingEngine::new(
        MockEmbeddingProvider::new(DIM),
        llm,
        InMemoryVectorIndex::new(DIM),
        store,
    )
    .with_ledger(ledger(Some(0.0005)))
    .with_settings(settings(2, 1));

    let summary = engine.match_all(&IncentiveFilter::default()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped_by_budget, 2);
    assert_eq!(summary.skipped, vec![id(2), id(3)]);
    assert!(summary.halted_by_budget());
    assert_eq!(engine.llm().call_count(), 1);
    assert!((summary.total_spend_usd - 0.00075).abs() < 1e-9);
}

// index_companies

#[tokio::test]
async fn test_index_companies_counts() {
    let blank = Company::new(id(12), "  ");
    let broken = Company::new(id(13), "Broken").with_sector("Retail");
    let embedder = MockEmbeddingProvider::new(DIM).fail_on(
        company_text(&broken).unwrap(),
        ProviderError::Malformed("bad vector".into()),
    );
    let store = InMemoryStore::new().with_companies([
        company_a(),
        company_b(),
        blank,
        broken,
        Company::new(id(14), "Dormant").inactive(),
    ]);
    let engine = engine_with_store(embedder, MockLlmProvider::new(), store, settings(2, 1));

    let report = engine.index_companies().await.unwrap();

    assert_eq!(
        report,
        IndexReport {
            indexed: 2,
            skipped: 1,
            failed: 1
        }
    );
    assert_eq!(engine.index().len().await.unwrap(), 2);

    let records = engine.store().call_records();
    assert_eq!(records.len(), 3);
    assert!(
        records
            .iter()
            .all(|r| r.kind == OperationKind::CompanyEmbedding)
    );
}

#[tokio::test]
async fn test_index_companies_reuses_cache() {
    let engine = engine(MockLlmProvider::new(), 2, 1);

    engine.index_companies().await.unwrap();
    engine.index_companies().await.unwrap();

    assert_eq!(engine.embedder().call_count(), 2);
    assert_eq!(engine.ledger().stats().cache_hits, 2);
}
