//! Matching engine (the candidate funnel).
//!
//! One run takes an incentive through `RETRIEVE -> SCORE -> SELECT -> MERGE -> DONE`:
//!
//! 1. the incentive is embedded through the ledger and the vector index returns its
//!    nearest companies; an empty or failing index skips this stage and the whole
//!    active population is scored instead,
//! 2. every candidate gets a [`DeterministicScore`] and the best K move on,
//! 3. the [`LlmBatchSelector`] asks the model for the best `min(M, K)`,
//! 4. semantic, deterministic and model scores are fused and the top `min(M, K)`
//!    replace the incentive's stored matches.
//!
//! Provider failures never fail a run: they route through fallbacks and are listed in
//! [`MatchDiagnostics::fallback_reasons`]. Only store errors and unknown incentives
//! surface as [`MatchError`].

mod error;
mod fusion;
mod stage;
mod types;

#[cfg(test)]
mod tests;

pub use error::MatchError;
pub use fusion::FusionWeights;
pub use stage::{FunnelStage, StagePath};
pub use types::{
    FunnelSettings, IndexReport, MatchAllSummary, MatchDiagnostics, MatchFailure, MatchResult,
};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::embedding::{EmbeddingProvider, company_text, incentive_text};
use crate::ledger::{CallContext, InferenceLedger, LedgerScope, LedgerStats, OperationKind};
use crate::model::{Company, Incentive, IncentiveFilter, IncentiveId, MatchSet};
use crate::provider::LlmProvider;
use crate::scoring::{DeterministicScore, DeterministicScorer};
use crate::selector::{
    LlmBatchSelector, Selection, SelectionOutcome, SelectorCandidate, SelectorConfig,
};
use crate::store::MatchStore;
use crate::vectordb::{IndexMetadata, VectorIndex};

/// A population member that survived stage 1, with its stage 2 annotation.
struct Candidate {
    /// Index into the run's population.
    pos: usize,
    similarity: Option<f32>,
    score: DeterministicScore,
}

enum RunOutcome {
    Matched(Box<MatchResult>),
    Failed(MatchError),
    SkippedByBudget,
}

pub struct MatchingEngine<E, P, V, S> {
    embedder: E,
    llm: P,
    index: V,
    store: S,
    ledger: Arc<InferenceLedger>,
    scorer: DeterministicScorer,
    selector: LlmBatchSelector,
    settings: FunnelSettings,
}

impl<E, P, V, S> std::fmt::Debug for MatchingEngine<E, P, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("ledger", &self.ledger)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<E, P, V, S> MatchingEngine<E, P, V, S>
where
    E: EmbeddingProvider,
    P: LlmProvider,
    V: VectorIndex,
    S: MatchStore,
{
    /// Engine with default settings and a private, unbounded ledger.
    pub fn new(embedder: E, llm: P, index: V, store: S) -> Self {
        let settings = FunnelSettings::default();
        Self {
            embedder,
            llm,
            index,
            store,
            ledger: Arc::new(InferenceLedger::default()),
            scorer: DeterministicScorer::new(settings.score_weights),
            selector: LlmBatchSelector::new(SelectorConfig {
                select_count: settings.select_count,
                ..SelectorConfig::default()
            }),
            settings,
        }
    }

    /// Validates `config` and wires every component from it.
    pub fn from_config(
        config: &Config,
        embedder: E,
        llm: P,
        index: V,
        store: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(embedder, llm, index, store)
            .with_ledger(Arc::new(InferenceLedger::new(config.ledger_config())))
            .with_settings(config.funnel_settings())
            .with_selector_config(config.selector_config()))
    }

    /// Shares `ledger` (and so its cache and spend) with other engines.
    pub fn with_ledger(mut self, ledger: Arc<InferenceLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Replaces stage sizes and scoring policy. The selector's M follows
    /// `settings.select_count`.
    pub fn with_settings(mut self, settings: FunnelSettings) -> Self {
        self.scorer = DeterministicScorer::new(settings.score_weights);
        let mut selector = self.selector.config().clone();
        selector.select_count = settings.select_count;
        self.selector = LlmBatchSelector::new(selector);
        self.settings = settings;
        self
    }

    /// Replaces model, token limit and claim penalty. `select_count` is taken from
    /// the engine settings.
    pub fn with_selector_config(mut self, mut config: SelectorConfig) -> Self {
        config.select_count = self.settings.select_count;
        self.selector = LlmBatchSelector::new(config);
        self
    }

    pub fn ledger(&self) -> &Arc<InferenceLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn llm(&self) -> &P {
        &self.llm
    }

    pub fn settings(&self) -> &FunnelSettings {
        &self.settings
    }

    /// Runs the funnel for one incentive and replaces its stored matches.
    #[instrument(skip(self))]
    pub async fn match_incentive(
        &self,
        incentive_id: IncentiveId,
    ) -> Result<MatchResult, MatchError> {
        let incentive = self
            .store
            .get_incentive(incentive_id)
            .await?
            .ok_or(MatchError::IncentiveNotFound(incentive_id))?;

        self.run(&incentive).await
    }

    /// Runs every incentive accepted by `filter` through the funnel on a bounded
    /// worker pool.
    ///
    /// A failed incentive is recorded and the batch goes on. Once the ledger's spend
    /// ceiling is reached no further incentive is started; runs already in flight
    /// finish.
    #[instrument(skip_all)]
    pub async fn match_all(&self, filter: &IncentiveFilter) -> Result<MatchAllSummary, MatchError> {
        let incentives: Vec<Incentive> = self
            .store
            .list_incentives()
            .await?
            .into_iter()
            .filter(|incentive| filter.accepts(incentive))
            .collect();

        info!(total = incentives.len(), "Starting batch match");
        let spent_before = self.ledger.spent_usd();

        let mut outcomes: Vec<(usize, IncentiveId, RunOutcome)> =
            stream::iter(incentives.iter().enumerate())
                .map(|(pos, incentive)| async move {
                    let outcome = match self.ledger.check_budget() {
                        Err(err) => {
                            info!(incentive_id = %incentive.id, %err, "Skipping incentive");
                            RunOutcome::SkippedByBudget
                        }
                        Ok(()) => match self.run(incentive).await {
                            Ok(result) => RunOutcome::Matched(Box::new(result)),
                            Err(err) => {
                                warn!(incentive_id = %incentive.id, %err, "Incentive failed");
                                RunOutcome::Failed(err)
                            }
                        },
                    };
                    (pos, incentive.id, outcome)
                })
                .buffer_unordered(self.settings.workers.max(1))
                .collect()
                .await;
        outcomes.sort_by_key(|(pos, ..)| *pos);

        let mut summary = MatchAllSummary {
            total: incentives.len(),
            ..MatchAllSummary::default()
        };
        for (_, incentive_id, outcome) in outcomes {
            match outcome {
                RunOutcome::Matched(result) => {
                    summary.succeeded += 1;
                    if result.diagnostics.is_degraded() {
                        summary.degraded += 1;
                    }
                    summary.results.push(*result);
                }
                RunOutcome::Failed(err) => {
                    summary.failed += 1;
                    summary.failures.push(MatchFailure {
                        incentive_id,
                        error: err.to_string(),
                    });
                }
                RunOutcome::SkippedByBudget => {
                    summary.skipped_by_budget += 1;
                    summary.skipped.push(incentive_id);
                }
            }
        }
        summary.total_spend_usd = self.ledger.spent_usd() - spent_before;

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped_by_budget = summary.skipped_by_budget,
            degraded = summary.degraded,
            spend_usd = summary.total_spend_usd,
            "Batch match finished"
        );
        Ok(summary)
    }

    /// Embeds every active company through the ledger and upserts it into the vector
    /// index, in population order.
    #[instrument(skip(self))]
    pub async fn index_companies(&self) -> Result<IndexReport, MatchError> {
        let companies = self.store.list_active_companies().await?;
        let ctx = CallContext {
            run_id: Some(Uuid::new_v4()),
            ..CallContext::new(OperationKind::CompanyEmbedding)
        };

        let embedded: Vec<_> = stream::iter(companies.iter())
            .map(|company| async move {
                let Some(text) = company_text(company) else {
                    return (company, None);
                };
                let response = self.ledger.embed(&self.embedder, &text, ctx).await;
                (company, Some(response))
            })
            .buffered(self.settings.workers.max(1))
            .collect()
            .await;

        let mut report = IndexReport::default();
        for (company, response) in embedded {
            match response {
                None => {
                    debug!(company_id = %company.id, "No embeddable text; not indexed");
                    report.skipped += 1;
                }
                Some(Err(err)) => {
                    warn!(company_id = %company.id, %err, "Company embedding failed");
                    report.failed += 1;
                }
                Some(Ok(response)) => {
                    let upsert = self
                        .index
                        .upsert(company.id, &response.value, IndexMetadata::from(company))
                        .await;
                    match upsert {
                        Ok(()) => report.indexed += 1,
                        Err(err) => {
                            warn!(company_id = %company.id, %err, "Vector upsert failed");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if let Some(run_id) = ctx.run_id {
            let records = self.ledger.records_for_run(run_id);
            self.store.append_call_records(&records).await?;
        }

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            "Company indexing finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(incentive_id = %incentive.id))]
    async fn run(&self, incentive: &Incentive) -> Result<MatchResult, MatchError> {
        let scope = self.ledger.scope(incentive.id);
        let mut diagnostics = MatchDiagnostics::new(scope.run_id());
        let population = self.store.list_active_companies().await?;

        let pool: Vec<(usize, Option<f32>)> =
            match self.retrieve(&scope, incentive, &population, &mut diagnostics).await {
                Some(hits) => {
                    diagnostics.retrieved = hits.len();
                    advance(&mut diagnostics, FunnelStage::Retrieve);
                    hits.into_iter().map(|(pos, sim)| (pos, Some(sim))).collect()
                }
                None => (0..population.len()).map(|pos| (pos, None)).collect(),
            };

        advance(&mut diagnostics, FunnelStage::Score);
        let profile = incentive.profile.as_ref();
        let mut candidates: Vec<Candidate> = pool
            .into_iter()
            .map(|(pos, similarity)| Candidate {
                pos,
                similarity,
                score: self.scorer.score(profile, &population[pos]),
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total
                .cmp(&a.score.total)
                .then_with(|| compare_similarity(b.similarity, a.similarity))
        });
        diagnostics.scored = candidates.len();
        candidates.truncate(self.settings.llm_candidates);
        diagnostics.sent_to_llm = candidates.len();
        debug!(
            scored = diagnostics.scored,
            shortlisted = candidates.len(),
            best = candidates.first().map(|c| c.score.total),
            "Deterministic scoring done"
        );

        let outcome = if candidates.is_empty() {
            None
        } else {
            advance(&mut diagnostics, FunnelStage::Select);
            let shortlist: Vec<SelectorCandidate<'_>> = candidates
                .iter()
                .map(|c| SelectorCandidate {
                    company: &population[c.pos],
                    deterministic: c.score.total,
                })
                .collect();
            Some(
                self.selector
                    .select(&scope, &self.llm, incentive, &shortlist)
                    .await,
            )
        };

        match &outcome {
            Some(SelectionOutcome::Fallback { reason, .. }) => {
                advance(&mut diagnostics, FunnelStage::ErrorFallback);
                diagnostics
                    .fallback_reasons
                    .push(format!("selection: {reason}"));
            }
            Some(SelectionOutcome::Model {
                selections,
                dropped,
                ..
            }) => {
                diagnostics.dropped_selections = *dropped;
                diagnostics.contradicted = selections.iter().filter(|s| s.contradicted).count();
            }
            None => {}
        }

        advance(&mut diagnostics, FunnelStage::Merge);
        let matches = self.merge(incentive, &population, &candidates, outcome.as_ref());
        diagnostics.selected = matches.len();

        let records = scope.records();
        let stats = LedgerStats::from_records(records.iter());
        diagnostics.run_spend_usd = stats.total_cost_usd;
        diagnostics.provider_calls = stats.misses;
        diagnostics.cache_hits = stats.cache_hits;

        self.store.append_call_records(&records).await?;
        self.store
            .replace_matches(incentive.id, matches.clone())
            .await?;
        advance(&mut diagnostics, FunnelStage::Done);

        info!(
            path = %diagnostics.path,
            selected = diagnostics.selected,
            spend_usd = diagnostics.run_spend_usd,
            cache_hits = diagnostics.cache_hits,
            degraded = diagnostics.is_degraded(),
            "Incentive matched"
        );

        Ok(MatchResult {
            incentive_id: incentive.id,
            matches: matches.into_vec(),
            diagnostics,
        })
    }

    /// Stage 1. `None` means "score the full population"; the reason is recorded.
    async fn retrieve(
        &self,
        scope: &LedgerScope<'_>,
        incentive: &Incentive,
        population: &[Company],
        diagnostics: &mut MatchDiagnostics,
    ) -> Option<Vec<(usize, f32)>> {
        let mut skip = |reason: String| {
            info!(%reason, "Semantic retrieval skipped; scoring full population");
            diagnostics.fallback_reasons.push(format!("retrieval: {reason}"));
            None
        };

        match self.index.len().await {
            Ok(0) => return skip("vector index is empty".to_string()),
            Err(err) => return skip(format!("vector index unavailable: {err}")),
            Ok(_) => {}
        }

        let Some(text) = incentive_text(incentive) else {
            return skip("incentive has no embeddable text".to_string());
        };

        let embedding = match scope
            .embed(&self.embedder, &text, OperationKind::IncentiveEmbedding)
            .await
        {
            Ok(response) => response.value,
            Err(err) => return skip(format!("incentive embedding failed: {err}")),
        };

        let hits = match self
            .index
            .query(&embedding, self.settings.retrieve_top_k, self.settings.min_similarity)
            .await
        {
            Ok(hits) => hits,
            Err(err) => return skip(format!("vector query failed: {err}")),
        };

        let positions: HashMap<_, usize> = population
            .iter()
            .enumerate()
            .map(|(pos, company)| (company.id, pos))
            .collect();
        let mapped: Vec<(usize, f32)> = hits
            .into_iter()
            .filter_map(|hit| positions.get(&hit.id).map(|&pos| (pos, hit.similarity)))
            .collect();

        if mapped.is_empty() {
            return skip("no active company above the similarity floor".to_string());
        }
        debug!(retrieved = mapped.len(), "Semantic retrieval done");
        Some(mapped)
    }

    /// Stage 4. Fuses every shortlisted candidate and keeps the top `min(M, K)`.
    fn merge(
        &self,
        incentive: &Incentive,
        population: &[Company],
        candidates: &[Candidate],
        outcome: Option<&SelectionOutcome>,
    ) -> MatchSet {
        let fallback = outcome.is_some_and(SelectionOutcome::is_fallback);
        let selections: HashMap<usize, &Selection> = outcome
            .map(|o| o.selections().iter().map(|s| (s.index, s)).collect())
            .unwrap_or_default();

        let fused = candidates.iter().enumerate().map(|(i, candidate)| {
            let selection = selections.get(&i).copied();
            let deterministic = candidate
                .score
                .normalized(self.settings.deterministic_normalizer);

            let score = if fallback {
                self.settings.weights.fuse(None, deterministic, None)
            } else {
                let llm = selection.map_or(0.0, |s| s.llm_score);
                self.settings
                    .weights
                    .fuse(candidate.similarity, deterministic, Some(llm))
            };

            let mut reasons: Vec<String> = selection.map(|s| s.reasons.clone()).unwrap_or_default();
            for reason in candidate.score.reasons() {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }

            (population[candidate.pos].id, score, reasons)
        });

        let mut matches = MatchSet::from_scored(incentive.id, fused);
        matches.truncate(self.settings.select_count.min(candidates.len()));
        matches
    }
}

fn advance(diagnostics: &mut MatchDiagnostics, stage: FunnelStage) {
    let from = diagnostics.path.current();
    if !diagnostics.path.enter(stage) {
        warn!(?from, to = %stage, "Unexpected funnel transition");
    }
}

/// Missing similarity compares equal so population order decides.
fn compare_similarity(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        _ => Ordering::Equal,
    }
}
