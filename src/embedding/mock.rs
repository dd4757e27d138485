use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{Embedding, EmbeddingProvider, StubEmbedder};
use crate::provider::{ProviderError, TokenUsage};

/// Embedding provider with pinned vectors for chosen texts.
///
/// Texts without a pinned vector get the [`StubEmbedder`] vector. Texts registered
/// with [`MockEmbeddingProvider::fail_on`] return an error.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    stub: StubEmbedder,
    pinned: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failures: Arc<Mutex<HashMap<String, ProviderError>>>,
    tokens_per_call: u64,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            stub: StubEmbedder::new(dimension),
            pinned: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            tokens_per_call: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pins `vector` (used as given, not normalized) for `text`.
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.lock().insert(text.into(), vector);
        self
    }

    pub fn fail_on(self, text: impl Into<String>, err: ProviderError) -> Self {
        self.failures.lock().insert(text.into(), err);
        self
    }

    pub fn with_tokens_per_call(mut self, tokens: u64) -> Self {
        self.tokens_per_call = tokens;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.failures.lock().get(text) {
            return Err(err.clone());
        }

        let vector = self
            .pinned
            .lock()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.stub.vector_for(text));

        Ok(Embedding {
            vector,
            usage: TokenUsage::new(self.tokens_per_call, 0),
        })
    }

    fn model(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.stub.dimension()
    }
}
