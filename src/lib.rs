//! Incentive matching funnel library crate.
//!
//! # Public API Surface
//!
//! ## Engine
//! - [`MatchingEngine`] - `match_incentive`, `match_all`, `index_companies`
//! - [`MatchResult`], [`MatchDiagnostics`], [`MatchAllSummary`], [`MatchError`]
//! - [`FunnelStage`], [`FusionWeights`], [`FunnelSettings`]
//!
//! ## Stages
//! - [`VectorIndex`], [`InMemoryVectorIndex`], [`QdrantVectorIndex`] - stage 1 retrieval
//! - [`DeterministicScorer`], [`ScoreWeights`] - stage 2 rule scoring
//! - [`LlmBatchSelector`], [`SelectionOutcome`] - stage 3 model selection and claim checks
//!
//! ## External Calls
//! - [`InferenceLedger`], [`LedgerScope`], [`PriceTable`], [`InferenceCallRecord`] -
//!   response cache, cost accounting and spend gate
//! - [`EmbeddingProvider`], [`OpenAiEmbedder`], [`StubEmbedder`]
//! - [`LlmProvider`], [`GenaiChatProvider`], [`ProviderError`]
//!
//! ## Records
//! - [`Incentive`], [`IncentiveProfile`], [`Company`], [`Match`], [`MatchSet`]
//! - [`MatchStore`], [`InMemoryStore`]
//!
//! ## Test/Mock Support
//! Mock providers are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod config;
pub mod constants;
pub mod embedding;
pub mod funnel;
pub mod hashing;
pub mod ledger;
pub mod model;
pub mod provider;
pub mod scoring;
pub mod selector;
pub mod store;
pub mod vectordb;

pub use config::{Config, ConfigError};
pub use constants::{DimValidationError, validate_embedding_dim};
pub use embedding::{
    EmbedderConfig, Embedding, EmbeddingError, EmbeddingProvider, OpenAiEmbedder, StubEmbedder,
    company_text, incentive_text,
};
#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbeddingProvider;
pub use funnel::{
    FunnelSettings, FunnelStage, FusionWeights, IndexReport, MatchAllSummary, MatchDiagnostics,
    MatchError, MatchFailure, MatchResult, MatchingEngine, StagePath,
};
pub use hashing::{RequestKey, hash_payload, request_key};
pub use ledger::{
    CallContext, InferenceCallRecord, InferenceError, InferenceLedger, LedgerConfig, LedgerScope,
    LedgerStats, ModelPrice, OperationKind, PriceTable, RetryPolicy,
};
pub use model::{
    Company, CompanyId, FundingBounds, Incentive, IncentiveFilter, IncentiveId, IncentiveProfile,
    Match, MatchSet,
};
pub use provider::{
    Completion, CompletionRequest, GenaiChatProvider, LlmProvider, ProviderError, TokenUsage,
};
#[cfg(any(test, feature = "mock"))]
pub use provider::{MockLlmProvider, MockReply};
pub use scoring::{DeterministicScore, DeterministicScorer, ScoreWeights};
pub use selector::{
    ClaimPenalty, FallbackReason, LlmBatchSelector, Selection, SelectionOutcome, SelectorConfig,
    SelectorError,
};
pub use store::{InMemoryStore, MatchStore, StoreError};
pub use vectordb::{
    IndexHit, IndexMetadata, InMemoryVectorIndex, QdrantVectorIndex, VectorIndex,
    VectorIndexError,
};
