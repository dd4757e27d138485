use genai::Client;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest};
use genai::webc;
use tracing::debug;

use super::{Completion, CompletionRequest, LlmProvider, ProviderError, TokenUsage};

/// Sampling temperature for selection prompts; low so that reruns stay close.
const SELECTION_TEMPERATURE: f64 = 0.1;

/// [`LlmProvider`] backed by the `genai` multi-provider client.
///
/// The model id picks the backend (`gpt-*` -> OpenAI, `claude-*` -> Anthropic, ...);
/// API keys come from the usual provider environment variables.
#[derive(Clone)]
pub struct GenaiChatProvider {
    client: Client,
}

impl GenaiChatProvider {
    pub fn new() -> Self {
        Self {
            client: Client::default(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for GenaiChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GenaiChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenaiChatProvider").finish_non_exhaustive()
    }
}

impl LlmProvider for GenaiChatProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let chat_req = ChatRequest::new(vec![ChatMessage::user(request.prompt.clone())]);
        let options = ChatOptions::default()
            .with_max_tokens(request.max_tokens)
            .with_temperature(SELECTION_TEMPERATURE);

        let response = self
            .client
            .exec_chat(&request.model, chat_req, Some(&options))
            .await
            .map_err(classify_genai_error)?;

        let text = response
            .first_text()
            .ok_or_else(|| ProviderError::Malformed("response has no text content".to_string()))?
            .to_string();

        let usage = TokenUsage::new(
            response.usage.prompt_tokens.unwrap_or(0).max(0) as u64,
            response.usage.completion_tokens.unwrap_or(0).max(0) as u64,
        );

        debug!(
            model = %request.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Chat completion received"
        );

        Ok(Completion { text, usage })
    }
}

/// Maps a `genai` failure onto the retry taxonomy.
///
/// HTTP failures keep their status, so permanent 4xx errors are not retried.
pub(crate) fn classify_genai_error(err: genai::Error) -> ProviderError {
    match err {
        genai::Error::WebModelCall { webc_error, .. }
        | genai::Error::WebAdapterCall { webc_error, .. } => classify_webc_error(webc_error),
        err @ (genai::Error::NoChatResponse { .. }
        | genai::Error::InvalidJsonResponseElement { .. }
        | genai::Error::ChatResponse { .. }
        | genai::Error::StreamParse { .. }) => ProviderError::Malformed(err.to_string()),
        err @ (genai::Error::WebStream { .. } | genai::Error::ReqwestEventSource(_)) => {
            ProviderError::Transport(err.to_string())
        }
        other => ProviderError::Unavailable(other.to_string()),
    }
}

fn classify_webc_error(err: webc::Error) -> ProviderError {
    match err {
        webc::Error::ResponseFailedStatus { status, body, .. } => {
            ProviderError::from_status(status.as_u16(), body)
        }
        webc::Error::Reqwest(err) => ProviderError::from(err),
        err @ (webc::Error::ResponseFailedNotJson { .. } | webc::Error::JsonValueExt(_)) => {
            ProviderError::Malformed(err.to_string())
        }
        other => ProviderError::Unavailable(other.to_string()),
    }
}
