use std::time::Duration;

use super::*;

#[test]
fn test_retryable_classification() {
    assert!(ProviderError::Transport("reset".into()).is_retryable());
    assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
    assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
    assert!(
        ProviderError::Status {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable()
    );

    assert!(
        !ProviderError::Status {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable()
    );
    assert!(!ProviderError::Malformed("not json".into()).is_retryable());
    assert!(!ProviderError::Unavailable("no key".into()).is_retryable());
}

#[test]
fn test_status_429_is_rate_limit() {
    assert!(matches!(
        ProviderError::from_status(429, "too many".into()),
        ProviderError::RateLimited(_)
    ));
    assert!(matches!(
        ProviderError::from_status(502, "bad gateway".into()),
        ProviderError::Status { status: 502, .. }
    ));
}

fn genai_status_error(status: u16, body: &str) -> genai::Error {
    genai::Error::WebModelCall {
        model_iden: genai::ModelIden::new(genai::adapter::AdapterKind::OpenAI, "gpt-4o-mini"),
        webc_error: genai::webc::Error::ResponseFailedStatus {
            status: reqwest::StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
            headers: Box::default(),
        },
    }
}

#[test]
fn test_genai_status_errors_keep_their_code() {
    let bad_request = chat::classify_genai_error(genai_status_error(400, "unknown model"));
    assert_eq!(
        bad_request,
        ProviderError::Status {
            status: 400,
            message: "unknown model".into()
        }
    );
    assert!(!bad_request.is_retryable());

    let unauthorized = chat::classify_genai_error(genai_status_error(401, "bad key"));
    assert!(!unauthorized.is_retryable());

    let throttled = chat::classify_genai_error(genai_status_error(429, "slow down"));
    assert!(matches!(throttled, ProviderError::RateLimited(_)));
    assert!(throttled.is_retryable());

    let outage = chat::classify_genai_error(genai_status_error(503, "overloaded"));
    assert!(outage.is_retryable());
}

#[test]
fn test_genai_non_http_errors_are_not_retried() {
    let model_iden = genai::ModelIden::new(genai::adapter::AdapterKind::OpenAI, "gpt-4o-mini");

    let no_key = chat::classify_genai_error(genai::Error::RequiresApiKey {
        model_iden: model_iden.clone(),
    });
    assert!(matches!(no_key, ProviderError::Unavailable(_)));

    let empty = chat::classify_genai_error(genai::Error::NoChatResponse { model_iden });
    assert!(matches!(empty, ProviderError::Malformed(_)));
    assert!(!empty.is_retryable());
}

#[test]
fn test_completion_request_cache_key_covers_all_fields() {
    let base = CompletionRequest::new("gpt-4o-mini", "prompt", 2000);

    assert_eq!(
        base.cache_key(),
        CompletionRequest::new("gpt-4o-mini", "prompt", 2000).cache_key()
    );
    assert_ne!(
        base.cache_key(),
        CompletionRequest::new("gpt-4o", "prompt", 2000).cache_key()
    );
    assert_ne!(
        base.cache_key(),
        CompletionRequest::new("gpt-4o-mini", "prompt", 100).cache_key()
    );
}

#[test]
fn test_token_usage_total() {
    assert_eq!(TokenUsage::new(120, 30).total(), 150);
}

#[tokio::test]
async fn test_mock_script_then_responder() {
    let mock = MockLlmProvider::replying("fallback").with_script([
        MockReply::Text("first".into()),
        MockReply::Fail(ProviderError::Transport("down".into())),
    ]);
    let request = CompletionRequest::new("m", "p", 10);

    assert_eq!(mock.complete(&request).await.unwrap().text, "first");
    assert!(mock.complete(&request).await.is_err());
    assert_eq!(mock.complete(&request).await.unwrap().text, "fallback");
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_mock_fixed_usage() {
    let mock = MockLlmProvider::replying("[]").with_usage(TokenUsage::new(1_000, 500));
    let completion = mock
        .complete(&CompletionRequest::new("m", "p", 10))
        .await
        .unwrap();

    assert_eq!(completion.usage, TokenUsage::new(1_000, 500));
}
