//! LLM completion providers.
//!
//! [`LlmProvider`] is the seam the selector talks to. Calls never go to a provider
//! directly: they pass through [`crate::ledger::InferenceLedger`], which adds caching,
//! cost accounting, timeouts and retries.

pub mod chat;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use chat::GenaiChatProvider;
pub use error::ProviderError;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockLlmProvider, MockReply};

use serde::{Deserialize, Serialize};

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One chat completion request; every field is part of the cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            max_tokens,
        }
    }

    pub fn cache_key(&self) -> crate::hashing::RequestKey {
        crate::hashing::request_key(&self.model, Some(self.max_tokens), &self.prompt)
    }
}

/// Provider answer plus its usage report.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Chat-completion backend.
pub trait LlmProvider: Send + Sync {
    /// Returns the model's text answer for `request`.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<Completion, ProviderError>> + Send;
}
