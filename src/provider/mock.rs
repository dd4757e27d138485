use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{Completion, CompletionRequest, LlmProvider, ProviderError, TokenUsage};

type Responder = dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(ProviderError),
}

/// Scriptable [`LlmProvider`] for tests.
///
/// Answers come from the script queue first, then from the responder (if set), then
/// fall back to an empty JSON array.
#[derive(Clone)]
pub struct MockLlmProvider {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    responder: Option<Arc<Responder>>,
    usage: Option<TokenUsage>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            responder: None,
            usage: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new().with_responder(move |_| Ok(text.clone()))
    }

    /// Always fails with `err`.
    pub fn failing(err: ProviderError) -> Self {
        Self::new().with_responder(move |_| Err(err.clone()))
    }

    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(f));
        self
    }

    pub fn with_script(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.script.lock().extend(replies);
        self
    }

    /// Reports a fixed usage for every call instead of the length estimate.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `complete` ran (cache hits in the ledger never reach it).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmProvider")
            .field("calls", &self.call_count())
            .field("scripted", &self.script.lock().len())
            .finish()
    }
}

impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        let text = match scripted {
            Some(MockReply::Text(text)) => text,
            Some(MockReply::Fail(err)) => return Err(err),
            None => match &self.responder {
                Some(responder) => responder(request)?,
                None => "[]".to_string(),
            },
        };

        let usage = self.usage.unwrap_or_else(|| {
            TokenUsage::new(
                (request.prompt.len() / 4) as u64,
                (text.len() / 4) as u64,
            )
        });

        Ok(Completion { text, usage })
    }
}
