//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `FUNNEL_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::embedding::{EmbedderConfig, EmbeddingError};
use crate::funnel::{FunnelSettings, FusionWeights};
use crate::ledger::{LedgerConfig, PriceTable, RetryPolicy};
use crate::scoring::ScoreWeights;
use crate::selector::{ClaimPenalty, SelectorConfig};
use crate::vectordb::{DEFAULT_COLLECTION_NAME, QdrantVectorIndex, VectorIndexResult};

/// Funnel configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `FUNNEL_*` overrides on top of defaults, then
/// [`Config::validate`] before building an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Stage 1 neighbour count. Default: `50`.
    pub retrieve_top_k: usize,
    /// Stage 1 similarity floor in `[0, 1]`. Default: `0.2`.
    pub min_similarity: f32,
    /// K: candidates shown to the model. Default: `15`.
    pub llm_candidates: usize,
    /// M: matches kept. Default: `5`.
    pub select_count: usize,

    pub weight_semantic: f32,
    pub weight_deterministic: f32,
    pub weight_llm: f32,
    pub deterministic_normalizer: f32,

    pub claim_penalty: f32,
    pub claim_penalty_floor: f32,

    /// `None` = unbounded.
    pub spend_ceiling_usd: Option<f64>,
    pub call_timeout_secs: u64,
    pub max_retries: u32,
    /// Incentives processed concurrently by `match_all`. Default: `4`.
    pub workers: usize,

    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub embedding_model: String,
    pub embedding_dim: usize,
    /// OpenAI-compatible base URL. Default: `https://api.openai.com/v1`.
    pub embedding_url: String,
    /// Qdrant endpoint URL. Default: `http://localhost:6334`.
    pub qdrant_url: String,
    /// Max entries per ledger cache. Default: `10_000`.
    pub cache_capacity: u64,
}

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";

impl Default for Config {
    fn default() -> Self {
        Self {
            retrieve_top_k: DEFAULT_RETRIEVE_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            llm_candidates: DEFAULT_LLM_CANDIDATES,
            select_count: DEFAULT_SELECT_COUNT,
            weight_semantic: DEFAULT_WEIGHT_SEMANTIC,
            weight_deterministic: DEFAULT_WEIGHT_DETERMINISTIC,
            weight_llm: DEFAULT_WEIGHT_LLM,
            deterministic_normalizer: DEFAULT_DETERMINISTIC_NORMALIZER,
            claim_penalty: DEFAULT_CLAIM_PENALTY,
            claim_penalty_floor: DEFAULT_CLAIM_PENALTY_FLOOR,
            spend_ceiling_usd: None,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            workers: DEFAULT_WORKERS,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            embedding_url: DEFAULT_EMBEDDING_URL.to_string(),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Config {
    const ENV_RETRIEVE_TOP_K: &'static str = "FUNNEL_RETRIEVE_TOP_K";
    const ENV_MIN_SIMILARITY: &'static str = "FUNNEL_MIN_SIMILARITY";
    const ENV_LLM_CANDIDATES: &'static str = "FUNNEL_LLM_CANDIDATES";
    const ENV_SELECT_COUNT: &'static str = "FUNNEL_SELECT_COUNT";
    const ENV_WEIGHT_SEMANTIC: &'static str = "FUNNEL_WEIGHT_SEMANTIC";
    const ENV_WEIGHT_DETERMINISTIC: &'static str = "FUNNEL_WEIGHT_DETERMINISTIC";
    const ENV_WEIGHT_LLM: &'static str = "FUNNEL_WEIGHT_LLM";
    const ENV_DETERMINISTIC_NORMALIZER: &'static str = "FUNNEL_DETERMINISTIC_NORMALIZER";
    const ENV_CLAIM_PENALTY: &'static str = "FUNNEL_CLAIM_PENALTY";
    const ENV_CLAIM_PENALTY_FLOOR: &'static str = "FUNNEL_CLAIM_PENALTY_FLOOR";
    const ENV_SPEND_CEILING_USD: &'static str = "FUNNEL_SPEND_CEILING_USD";
    const ENV_CALL_TIMEOUT_SECS: &'static str = "FUNNEL_CALL_TIMEOUT_SECS";
    const ENV_MAX_RETRIES: &'static str = "FUNNEL_MAX_RETRIES";
    const ENV_WORKERS: &'static str = "FUNNEL_WORKERS";
    const ENV_LLM_MODEL: &'static str = "FUNNEL_LLM_MODEL";
    const ENV_LLM_MAX_TOKENS: &'static str = "FUNNEL_LLM_MAX_TOKENS";
    const ENV_EMBEDDING_MODEL: &'static str = "FUNNEL_EMBEDDING_MODEL";
    const ENV_EMBEDDING_DIM: &'static str = "FUNNEL_EMBEDDING_DIM";
    const ENV_EMBEDDING_URL: &'static str = "FUNNEL_EMBEDDING_URL";
    const ENV_QDRANT_URL: &'static str = "FUNNEL_QDRANT_URL";
    const ENV_CACHE_CAPACITY: &'static str = "FUNNEL_CACHE_CAPACITY";

    /// Loads configuration from environment variables (falling back to defaults).
    ///
    /// Only parsing happens here; call [`Config::validate`] for consistency checks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();

        Ok(Self {
            retrieve_top_k: Self::parse_from_env(Self::ENV_RETRIEVE_TOP_K, d.retrieve_top_k)?,
            min_similarity: Self::parse_from_env(Self::ENV_MIN_SIMILARITY, d.min_similarity)?,
            llm_candidates: Self::parse_from_env(Self::ENV_LLM_CANDIDATES, d.llm_candidates)?,
            select_count: Self::parse_from_env(Self::ENV_SELECT_COUNT, d.select_count)?,
            weight_semantic: Self::parse_from_env(Self::ENV_WEIGHT_SEMANTIC, d.weight_semantic)?,
            weight_deterministic: Self::parse_from_env(
                Self::ENV_WEIGHT_DETERMINISTIC,
                d.weight_deterministic,
            )?,
            weight_llm: Self::parse_from_env(Self::ENV_WEIGHT_LLM, d.weight_llm)?,
            deterministic_normalizer: Self::parse_from_env(
                Self::ENV_DETERMINISTIC_NORMALIZER,
                d.deterministic_normalizer,
            )?,
            claim_penalty: Self::parse_from_env(Self::ENV_CLAIM_PENALTY, d.claim_penalty)?,
            claim_penalty_floor: Self::parse_from_env(
                Self::ENV_CLAIM_PENALTY_FLOOR,
                d.claim_penalty_floor,
            )?,
            spend_ceiling_usd: Self::parse_optional_from_env(Self::ENV_SPEND_CEILING_USD)?,
            call_timeout_secs: Self::parse_from_env(
                Self::ENV_CALL_TIMEOUT_SECS,
                d.call_timeout_secs,
            )?,
            max_retries: Self::parse_from_env(Self::ENV_MAX_RETRIES, d.max_retries)?,
            workers: Self::parse_from_env(Self::ENV_WORKERS, d.workers)?,
            llm_model: Self::parse_string_from_env(Self::ENV_LLM_MODEL, d.llm_model),
            llm_max_tokens: Self::parse_from_env(Self::ENV_LLM_MAX_TOKENS, d.llm_max_tokens)?,
            embedding_model: Self::parse_string_from_env(
                Self::ENV_EMBEDDING_MODEL,
                d.embedding_model,
            ),
            embedding_dim: Self::parse_from_env(Self::ENV_EMBEDDING_DIM, d.embedding_dim)?,
            embedding_url: Self::parse_string_from_env(Self::ENV_EMBEDDING_URL, d.embedding_url),
            qdrant_url: Self::parse_string_from_env(Self::ENV_QDRANT_URL, d.qdrant_url),
            cache_capacity: Self::parse_from_env(Self::ENV_CACHE_CAPACITY, d.cache_capacity)?,
        })
    }

    /// Rejects values the funnel cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });

        if self.select_count == 0 {
            return invalid("select_count", "must be > 0".into());
        }
        if self.llm_candidates < self.select_count {
            return invalid(
                "llm_candidates",
                format!(
                    "{} is less than select_count {}",
                    self.llm_candidates, self.select_count
                ),
            );
        }
        if self.retrieve_top_k == 0 {
            return invalid("retrieve_top_k", "must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return invalid("min_similarity", format!("{} is outside [0, 1]", self.min_similarity));
        }

        let weights = [self.weight_semantic, self.weight_deterministic, self.weight_llm];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("weights", format!("{weights:?} contains a negative value"));
        }
        if weights.iter().sum::<f32>() <= 0.0 {
            return invalid("weights", "at least one weight must be > 0".into());
        }
        if self.deterministic_normalizer <= 0.0 {
            return invalid("deterministic_normalizer", "must be > 0".into());
        }

        if !(0.0..=1.0).contains(&self.claim_penalty) {
            return invalid("claim_penalty", format!("{} is outside [0, 1]", self.claim_penalty));
        }
        if !(0.0..=1.0).contains(&self.claim_penalty_floor) {
            return invalid(
                "claim_penalty_floor",
                format!("{} is outside [0, 1]", self.claim_penalty_floor),
            );
        }

        if let Some(ceiling) = self.spend_ceiling_usd
            && (!ceiling.is_finite() || ceiling < 0.0)
        {
            return invalid("spend_ceiling_usd", format!("{ceiling} must be >= 0"));
        }
        if self.call_timeout_secs == 0 {
            return invalid("call_timeout_secs", "must be > 0".into());
        }
        if self.workers == 0 {
            return invalid("workers", "must be > 0".into());
        }
        if self.embedding_dim == 0 {
            return invalid("embedding_dim", "must be > 0".into());
        }
        if self.llm_max_tokens == 0 {
            return invalid("llm_max_tokens", "must be > 0".into());
        }
        if self.embedding_model.trim().is_empty() {
            return invalid("embedding_model", "must not be empty".into());
        }
        let urls = [
            ("embedding_url", &self.embedding_url),
            ("qdrant_url", &self.qdrant_url),
        ];
        for (field, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return invalid(field, format!("{url} is not an http(s) URL"));
            }
        }

        Ok(())
    }

    pub fn fusion_weights(&self) -> FusionWeights {
        FusionWeights {
            semantic: self.weight_semantic,
            deterministic: self.weight_deterministic,
            llm: self.weight_llm,
        }
    }

    pub fn claim_penalty(&self) -> ClaimPenalty {
        ClaimPenalty {
            amount: self.claim_penalty,
            floor: self.claim_penalty_floor,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            model: self.llm_model.clone(),
            max_tokens: self.llm_max_tokens,
            select_count: self.select_count,
            penalty: self.claim_penalty(),
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        let mut prices = PriceTable::default();
        prices.set_fallback_model(self.llm_model.clone());

        LedgerConfig {
            cache_capacity: self.cache_capacity,
            spend_ceiling_usd: self.spend_ceiling_usd,
            retry: RetryPolicy {
                timeout: Duration::from_secs(self.call_timeout_secs),
                max_retries: self.max_retries,
                backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            },
            prices,
        }
    }

    /// Embedding client settings; the API key still comes from `OPENAI_API_KEY`.
    pub fn embedder_config(&self) -> Result<EmbedderConfig, EmbeddingError> {
        let config = EmbedderConfig::from_env(self.embedding_url.clone())?
            .with_model(self.embedding_model.clone(), self.embedding_dim)
            .with_timeout(Duration::from_secs(self.call_timeout_secs));
        config.validate()?;
        Ok(config)
    }

    /// Connects to `qdrant_url` and ensures the company collection at `embedding_dim`.
    pub async fn connect_index(&self) -> VectorIndexResult<QdrantVectorIndex> {
        QdrantVectorIndex::connect(&self.qdrant_url, DEFAULT_COLLECTION_NAME, self.embedding_dim)
            .await
    }

    pub fn funnel_settings(&self) -> FunnelSettings {
        FunnelSettings {
            retrieve_top_k: self.retrieve_top_k,
            min_similarity: self.min_similarity,
            llm_candidates: self.llm_candidates,
            select_count: self.select_count,
            weights: self.fusion_weights(),
            deterministic_normalizer: self.deterministic_normalizer,
            score_weights: ScoreWeights::default(),
            workers: self.workers,
        }
    }

    fn parse_from_env<T>(var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match env::var(var) {
            Ok(value) if !value.trim().is_empty() => {
                value.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                    var,
                    value: value.clone(),
                    reason: e.to_string(),
                })
            }
            _ => Ok(default),
        }
    }

    fn parse_optional_from_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match env::var(var) {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::ParseError {
                    var,
                    value: value.clone(),
                    reason: e.to_string(),
                }),
            _ => Ok(None),
        }
    }

    fn parse_string_from_env(var: &str, default: String) -> String {
        env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }
}
