//! HTTP client for Gemini-style `generateContent` endpoints.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::types::{GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::domain::errors::LlmError;
use crate::domain::models::config::LlmConfig;
use crate::domain::ports::completion::{CompletionClient, CompletionRequest};

/// Longest response body excerpt kept in errors.
const BODY_EXCERPT: usize = 300;

/// Rate-limited, retrying completion client.
///
/// One instance is shared by every worker in a pass, so the rate limit
/// applies to the pass as a whole.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// Fails with [`LlmError::MissingCredential`] when no API key is
    /// configured or exported.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| LlmError::MissingCredential(config.api_key_env.clone()))?;

        let http_client = ReqwestClient::builder()
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(config.rate_limit.requests_per_second),
            retry_policy: RetryPolicy::from_config(&config.retry),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    async fn send_once(
        &self,
        request: &CompletionRequest,
        body: &GenerateContentRequest,
    ) -> Result<String, LlmError> {
        self.rate_limiter.acquire().await;

        let response = self
            .http_client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(request.timeout)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_chars(&body, BODY_EXCERPT);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                LlmError::RateLimited(body)
            } else {
                LlmError::Status {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        Ok(parsed.text())
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = GenerateContentRequest::single_turn(
            request.system.as_deref(),
            &request.prompt,
            GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        );

        tracing::trace!(model = %request.model, prompt_chars = request.prompt.len(), "sending completion");
        self.retry_policy
            .execute(|| self.send_once(&request, &body))
            .await
    }
}

fn classify_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Network(e.to_string())
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    const PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn client(base_url: String) -> GeminiClient {
        let config = LlmConfig {
            api_key: Some("test-key".into()),
            base_url,
            ..Default::default()
        };
        GeminiClient::from_config(&config)
            .unwrap()
            .with_retry_policy(RetryPolicy::new(
                Duration::from_millis(1),
                Duration::from_millis(5),
                Duration::from_secs(2),
            ))
    }

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: "gemini-2.5-flash".into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.0,
            max_output_tokens: 10,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_complete_sends_key_and_generation_config() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"parts": [{"text": "Is it?"}]}],
                "generationConfig": {"temperature": 0.0, "maxOutputTokens": 10}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"YES"}]}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reply = client(server.url()).complete(request("Is it?")).await.unwrap();
        assert_eq!(reply, "YES");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", PATH)
            .with_status(503)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"NO"}]}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reply = client(server.url()).complete(request("q")).await.unwrap();
        assert_eq!(reply, "NO");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(400)
            .with_body(r#"{"error":{"message":"API key not valid"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(server.url()).complete(request("q")).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 400, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = client(server.url()).complete(request("q")).await.unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_key_is_reported() {
        temp_env::with_var_unset("RAGTUNE_TEST_MISSING_KEY", || {
            let config = LlmConfig {
                api_key: None,
                api_key_env: "RAGTUNE_TEST_MISSING_KEY".into(),
                ..Default::default()
            };
            match GeminiClient::from_config(&config) {
                Err(LlmError::MissingCredential(name)) => {
                    assert_eq!(name, "RAGTUNE_TEST_MISSING_KEY");
                }
                _ => panic!("expected missing credential"),
            }
        });
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("dééééé", 3), "déé");
        assert_eq!(truncate_chars("ab", 3), "ab");
    }
}
