use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF_MS};
use crate::hashing::RequestKey;
use crate::model::IncentiveId;

/// What an external call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    IncentiveEmbedding,
    CompanyEmbedding,
    BatchMatch,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationKind::IncentiveEmbedding => "incentive_embedding",
            OperationKind::CompanyEmbedding => "company_embedding",
            OperationKind::BatchMatch => "batch_match",
        };
        f.write_str(label)
    }
}

/// Who is asking; copied onto every record the call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub kind: OperationKind,
    pub incentive_id: Option<IncentiveId>,
    pub run_id: Option<Uuid>,
}

impl CallContext {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            incentive_id: None,
            run_id: None,
        }
    }
}

/// One ledger row. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceCallRecord {
    pub id: Uuid,
    pub kind: OperationKind,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub cache_hit: bool,
    pub success: bool,
    pub error: Option<String>,
    pub incentive_id: Option<IncentiveId>,
    pub run_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// A ledger answer plus where it came from.
#[derive(Debug, Clone)]
pub struct LedgerResponse<T> {
    pub value: T,
    pub key: RequestKey,
    pub cache_hit: bool,
}

pub type CachedVector = Arc<[f32]>;
pub type CachedText = Arc<str>;

/// Timeout and retry settings for provider calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KindStats {
    pub calls: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub cost_usd: f64,
}

/// Aggregates over the ledger records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub calls: u64,
    pub cache_hits: u64,
    /// Successful billed calls.
    pub misses: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost_usd: f64,
    pub by_kind: BTreeMap<OperationKind, KindStats>,
}

impl LedgerStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a InferenceCallRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.calls += 1;
            stats.input_tokens += record.input_tokens;
            stats.output_tokens += record.output_tokens;
            stats.total_cost_usd += record.cost_usd;

            let kind = stats.by_kind.entry(record.kind).or_default();
            kind.calls += 1;
            kind.cost_usd += record.cost_usd;

            if !record.success {
                stats.failures += 1;
                kind.failures += 1;
            } else if record.cache_hit {
                stats.cache_hits += 1;
                kind.cache_hits += 1;
            } else {
                stats.misses += 1;
            }
        }
        stats
    }

    /// Hits over successful lookups; 0 when nothing succeeded yet.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}
