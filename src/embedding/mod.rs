//! Text embedding providers.
//!
//! - [`OpenAiEmbedder`] calls an OpenAI-compatible `/embeddings` endpoint.
//! - [`StubEmbedder`] is a deterministic, hash-seeded embedder for offline runs.
//! - [`text`] builds the texts that get embedded.
//!
//! Providers are never called directly by the funnel; every call goes through
//! [`crate::ledger::InferenceLedger::embed`].

mod error;
/// OpenAI-compatible HTTP embedder.
pub mod openai;
/// Deterministic embedder (no network).
pub mod stub;
/// Embedding text builders.
pub mod text;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use error::EmbeddingError;
pub use openai::{EmbedderConfig, OpenAiEmbedder};
pub use stub::StubEmbedder;
pub use text::{company_text, incentive_text};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbeddingProvider;

use crate::provider::{ProviderError, TokenUsage};

/// One embedding plus what the provider billed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub usage: TokenUsage,
}

/// Text to fixed-length vector.
///
/// Same text must give the same vector from the caller's point of view; the ledger
/// cache relies on it.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Embedding, ProviderError>> + Send;

    /// Model id used for cache keys and pricing.
    fn model(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// L2-normalizes in place. Zero vectors are left as is.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
