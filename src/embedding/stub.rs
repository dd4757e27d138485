use tracing::debug;

use super::{Embedding, EmbeddingProvider, normalize};
use crate::hashing::hash_payload;
use crate::provider::{ProviderError, TokenUsage};

/// Deterministic embedder seeded by the BLAKE3 hash of the input.
///
/// Vectors are unit length and carry no semantics: two different texts are
/// roughly orthogonal. Usage is reported as zero tokens.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    model: String,
    dimension: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "stub-embedding".to_string(),
            dimension,
        }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = hash_payload(text.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut state = u64::from_le_bytes(seed);

        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let value = ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0;
            vector.push(value);
        }
        normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        debug!(text_len = text.len(), "generating stub embedding");
        Ok(Embedding {
            vector: self.vector_for(text),
            usage: TokenUsage::default(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
