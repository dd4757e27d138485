//! Inference ledger and response cache.
//!
//! Every embedding and completion call goes through [`InferenceLedger`]:
//!
//! - the request is hashed ([`crate::hashing::request_key`]) and looked up in a
//!   content-addressed cache; identical requests from different incentives share one
//!   entry,
//! - on a miss the provider is called under a timeout, with retries for transient
//!   errors, and the result is priced from the [`PriceTable`],
//! - every outcome (hit, billed miss, failed attempt, rejected output) appends one
//!   [`InferenceCallRecord`]; records are never changed afterwards,
//! - once cumulative spend reaches the ceiling, misses are refused with
//!   [`InferenceError::BudgetExceeded`] while hits keep being served.
//!
//! Concurrent misses on the same key are collapsed: one caller runs the provider,
//! the others wait for its result and are recorded as cache hits.

mod error;
mod price;
mod scope;
mod types;

#[cfg(test)]
mod tests;

pub use error::{InferenceError, InferenceResult};
pub use price::{ModelPrice, PriceTable};
pub use scope::LedgerScope;
pub use types::{
    CachedText, CachedVector, CallContext, InferenceCallRecord, KindStats, LedgerResponse,
    LedgerStats, OperationKind, RetryPolicy,
};

use std::future::Future;

use chrono::Utc;
use moka::future::Cache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::DEFAULT_CACHE_CAPACITY;
use crate::embedding::EmbeddingProvider;
use crate::hashing::{RequestKey, request_key, short_hex};
use crate::model::IncentiveId;
use crate::provider::{CompletionRequest, LlmProvider, ProviderError, TokenUsage};

/// Ledger construction settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub cache_capacity: u64,
    /// `None` means unbounded.
    pub spend_ceiling_usd: Option<f64>,
    pub retry: RetryPolicy,
    pub prices: PriceTable,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            spend_ceiling_usd: None,
            retry: RetryPolicy::default(),
            prices: PriceTable::default(),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<InferenceCallRecord>,
    spent_usd: f64,
}

pub struct InferenceLedger {
    embeddings: Cache<RequestKey, CachedVector>,
    completions: Cache<RequestKey, CachedText>,
    state: Mutex<LedgerState>,
    config: LedgerConfig,
}

impl std::fmt::Debug for InferenceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InferenceLedger")
            .field("embeddings", &self.embeddings.entry_count())
            .field("completions", &self.completions.entry_count())
            .field("records", &state.records.len())
            .field("spent_usd", &state.spent_usd)
            .field("ceiling_usd", &self.config.spend_ceiling_usd)
            .finish()
    }
}

impl Default for InferenceLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl InferenceLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            embeddings: Cache::builder().max_capacity(config.cache_capacity).build(),
            completions: Cache::builder().max_capacity(config.cache_capacity).build(),
            state: Mutex::new(LedgerState::default()),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Embeds `text` through the cache.
    pub async fn embed<E: EmbeddingProvider>(
        &self,
        provider: &E,
        text: &str,
        ctx: CallContext,
    ) -> InferenceResult<LedgerResponse<CachedVector>> {
        let model = provider.model();
        let key = request_key(model, None, text);

        let entry = self
            .embeddings
            .entry(key)
            .or_try_insert_with(self.call_provider(ctx, model, || async {
                let embedding = provider.embed(text).await?;
                Ok::<_, ProviderError>((CachedVector::from(embedding.vector), embedding.usage))
            }))
            .await?;

        let cache_hit = !entry.is_fresh();
        if cache_hit {
            self.record_hit(ctx, model, &key);
        }

        Ok(LedgerResponse {
            value: entry.into_value(),
            key,
            cache_hit,
        })
    }

    /// Runs a chat completion through the cache.
    pub async fn complete<P: LlmProvider>(
        &self,
        provider: &P,
        request: &CompletionRequest,
        ctx: CallContext,
    ) -> InferenceResult<LedgerResponse<CachedText>> {
        let key = request.cache_key();
        let model = request.model.as_str();

        let entry = self
            .completions
            .entry(key)
            .or_try_insert_with(self.call_provider(ctx, model, || async {
                let completion = provider.complete(request).await?;
                Ok::<_, ProviderError>((CachedText::from(completion.text), completion.usage))
            }))
            .await?;

        let cache_hit = !entry.is_fresh();
        if cache_hit {
            self.record_hit(ctx, model, &key);
        }

        Ok(LedgerResponse {
            value: entry.into_value(),
            key,
            cache_hit,
        })
    }

    /// Drops a completion the caller could not use and records why.
    ///
    /// The raw text is kept in the record's error field; the next identical request
    /// goes back to the provider.
    pub async fn reject_completion(
        &self,
        key: &RequestKey,
        model: &str,
        raw: &str,
        reason: &str,
        ctx: CallContext,
    ) {
        self.completions.invalidate(key).await;
        warn!(
            key = %short_hex(key),
            kind = %ctx.kind,
            reason,
            "Rejected completion evicted from cache"
        );
        self.append(
            ctx,
            model,
            TokenUsage::default(),
            0.0,
            false,
            Some(format!("{reason}; raw response: {raw}")),
        );
    }

    /// Per-incentive view that tags every call with one run id.
    pub fn scope(&self, incentive_id: IncentiveId) -> LedgerScope<'_> {
        LedgerScope::new(self, incentive_id, Uuid::new_v4())
    }

    pub fn spent_usd(&self) -> f64 {
        self.state.lock().spent_usd
    }

    pub fn is_budget_exhausted(&self) -> bool {
        match self.config.spend_ceiling_usd {
            Some(ceiling) => self.spent_usd() >= ceiling,
            None => false,
        }
    }

    pub fn check_budget(&self) -> InferenceResult<()> {
        if let Some(ceiling) = self.config.spend_ceiling_usd {
            let spent = self.spent_usd();
            if spent >= ceiling {
                return Err(InferenceError::BudgetExceeded { spent, ceiling });
            }
        }
        Ok(())
    }

    /// Snapshot of all records in append order.
    pub fn records(&self) -> Vec<InferenceCallRecord> {
        self.state.lock().records.clone()
    }

    pub fn records_for_run(&self, run_id: Uuid) -> Vec<InferenceCallRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.run_id == Some(run_id))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats::from_records(self.state.lock().records.iter())
    }

    /// Calls the provider under the retry policy; runs only on a cache miss.
    async fn call_provider<T, F, Fut>(
        &self,
        ctx: CallContext,
        model: &str,
        mut call: F,
    ) -> InferenceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, TokenUsage), ProviderError>>,
    {
        self.check_budget().inspect_err(|err| {
            info!(kind = %ctx.kind, %err, "Provider call refused by spend gate");
        })?;

        let policy = self.config.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(policy.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(policy.timeout)),
            };

            match outcome {
                Ok((value, usage)) => {
                    let cost = self.config.prices.cost(model, usage);
                    debug!(
                        kind = %ctx.kind,
                        model,
                        attempt,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        cost_usd = cost,
                        "Cache miss served by provider"
                    );
                    self.append(ctx, model, usage, cost, false, None);
                    return Ok(value);
                }
                Err(err) => {
                    self.append(
                        ctx,
                        model,
                        TokenUsage::default(),
                        0.0,
                        false,
                        Some(err.to_string()),
                    );

                    if !err.is_retryable() || attempt > policy.max_retries {
                        warn!(
                            kind = %ctx.kind,
                            model,
                            attempt,
                            error_kind = err.kind(),
                            %err,
                            "Provider call failed"
                        );
                        return Err(InferenceError::Provider {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    debug!(kind = %ctx.kind, attempt, %err, "Retrying provider call");
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
        }
    }

    fn record_hit(&self, ctx: CallContext, model: &str, key: &RequestKey) {
        debug!(kind = %ctx.kind, model, key = %short_hex(key), "Cache hit");
        self.append(ctx, model, TokenUsage::default(), 0.0, true, None);
    }

    fn append(
        &self,
        ctx: CallContext,
        model: &str,
        usage: TokenUsage,
        cost_usd: f64,
        cache_hit: bool,
        error: Option<String>,
    ) {
        let record = InferenceCallRecord {
            id: Uuid::new_v4(),
            kind: ctx.kind,
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            cache_hit,
            success: error.is_none(),
            error,
            incentive_id: ctx.incentive_id,
            run_id: ctx.run_id,
            timestamp: Utc::now(),
        };

        let mut state = self.state.lock();
        state.spent_usd += cost_usd;
        state.records.push(record);
    }
}
