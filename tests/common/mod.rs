//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use funnel::{
    Company, FunnelSettings, InMemoryStore, InMemoryVectorIndex, Incentive, IncentiveProfile,
    InferenceLedger, LedgerConfig, MatchingEngine, MockEmbeddingProvider, MockLlmProvider,
    RetryPolicy,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const DIM: usize = 16;

pub const INCENTIVE: Uuid = Uuid::from_u128(1);
pub const COMPANY_A: Uuid = Uuid::from_u128(100);
pub const COMPANY_B: Uuid = Uuid::from_u128(101);
pub const COMPANY_C: Uuid = Uuid::from_u128(102);

pub type Engine =
    MatchingEngine<MockEmbeddingProvider, MockLlmProvider, InMemoryVectorIndex, InMemoryStore>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Codes {62010, 62020}, sector {Software}.
pub fn digital_incentive() -> Incentive {
    Incentive::new(INCENTIVE, "Digital Transition Support")
        .with_description("Grants for software and IT services companies")
        .with_profile(IncentiveProfile {
            eligible_codes: ["62010".to_string(), "62020".to_string()].into_iter().collect(),
            eligible_sectors: vec!["Software".to_string()],
            summary: Some("Co-funds digital products".to_string()),
            ..Default::default()
        })
}

/// Code 62010 (150) and sector token overlap (20).
pub fn company_a() -> Company {
    Company::new(COMPANY_A, "Acme Systems")
        .with_code("62010")
        .with_sector("Software development")
}

/// Scores 0.
pub fn company_b() -> Company {
    Company::new(COMPANY_B, "Bolt Advocates")
        .with_code("71100")
        .with_sector("Legal")
}

/// Code 62020 only (150).
pub fn company_c() -> Company {
    Company::new(COMPANY_C, "Crane Analytics").with_code("62020")
}

pub fn ledger(ceiling: Option<f64>) -> Arc<InferenceLedger> {
    Arc::new(InferenceLedger::new(LedgerConfig {
        spend_ceiling_usd: ceiling,
        retry: RetryPolicy {
            timeout: Duration::from_millis(250),
            max_retries: 0,
            backoff: Duration::from_millis(1),
        },
        ..LedgerConfig::default()
    }))
}

pub fn settings(k: usize, m: usize) -> FunnelSettings {
    FunnelSettings {
        llm_candidates: k,
        select_count: m,
        workers: 1,
        ..FunnelSettings::default()
    }
}

pub fn engine(
    llm: MockLlmProvider,
    companies: impl IntoIterator<Item = Company>,
    k: usize,
    m: usize,
) -> Engine {
    let store = InMemoryStore::new()
        .with_incentives([digital_incentive()])
        .with_companies(companies);

    MatchingEngine::new(
        MockEmbeddingProvider::new(DIM),
        llm,
        InMemoryVectorIndex::new(DIM),
        store,
    )
    .with_ledger(ledger(None))
    .with_settings(settings(k, m))
}

/// One model selection as JSON.
pub fn selection(company: Uuid, score: f64, reasons: &[&str]) -> String {
    let reasons: Vec<String> = reasons.iter().map(|r| format!("\"{r}\"")).collect();
    format!(
        r#"{{"company_id":"{company}","score":{score},"reasons":[{}]}}"#,
        reasons.join(",")
    )
}

pub fn selections(entries: &[String]) -> String {
    format!("[{}]", entries.join(","))
}
