//! Binary semantic-equivalence judgment delegated to a remote LLM.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::ports::completion::{CompletionClient, CompletionRequest};
use crate::domain::ports::engine::NOT_FOUND_SENTINEL;
use crate::infrastructure::llm::truncate_chars;

const GOLD_PROMPT_CHARS: usize = 100;
const PREDICTION_PROMPT_CHARS: usize = 200;
const JUDGE_MAX_OUTPUT_TOKENS: u32 = 10;

/// Asks a remote model whether a prediction matches the gold answer.
///
/// Every failure mode (empty prediction, transport error, unclear reply)
/// scores `0.0`, so judging never aborts a pass.
#[derive(Clone)]
pub struct LlmJudge {
    client: Arc<dyn CompletionClient>,
    model: String,
    timeout: Duration,
}

impl LlmJudge {
    /// Judge calling `model` through `client`.
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    /// Judge model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// `1.0` when the model replies YES, `0.0` otherwise.
    pub async fn judge(&self, question: &str, gold: &str, prediction: &str) -> f64 {
        if prediction.trim().is_empty() || prediction.contains(NOT_FOUND_SENTINEL) {
            return 0.0;
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            system: None,
            prompt: judge_prompt(question, gold, prediction),
            temperature: 0.0,
            max_output_tokens: JUDGE_MAX_OUTPUT_TOKENS,
            timeout: self.timeout,
        };

        match self.client.complete(request).await {
            Ok(reply) => parse_verdict(&reply),
            Err(e) => {
                tracing::warn!(error = %e, "judge call failed, scoring as NO");
                0.0
            }
        }
    }
}

fn judge_prompt(question: &str, gold: &str, prediction: &str) -> String {
    format!(
        "Is this answer correct or semantically equivalent to the gold answer?\n\n\
         Question: {question}\n\
         Gold: {}\n\
         Answer: {}\n\n\
         Reply YES or NO only.",
        truncate_chars(gold, GOLD_PROMPT_CHARS),
        truncate_chars(prediction, PREDICTION_PROMPT_CHARS),
    )
}

/// Replies that start with YES (any case) count; everything else is NO.
pub fn parse_verdict(reply: &str) -> f64 {
    if reply.trim_start().to_uppercase().starts_with("YES") {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(reply: Result<&str, ()>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(request);
            self.reply.clone().map_err(|()| LlmError::Timeout)
        }
    }

    fn judge(client: Arc<Scripted>) -> LlmJudge {
        LlmJudge::new(client, "gemini-2.5-flash", Duration::from_secs(5))
    }

    #[test]
    fn test_parse_verdict() {
        assert!((parse_verdict("YES") - 1.0).abs() < f64::EPSILON);
        assert!((parse_verdict("  yes, it matches") - 1.0).abs() < f64::EPSILON);
        assert!(parse_verdict("NO").abs() < f64::EPSILON);
        assert!(parse_verdict("Maybe yes").abs() < f64::EPSILON);
        assert!(parse_verdict("").abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_yes_scores_one_with_budgeted_request() {
        let client = Scripted::new(Ok("YES"));
        let score = judge(client.clone()).judge("Q?", &"g".repeat(150), &"p".repeat(250)).await;

        assert!((score - 1.0).abs() < f64::EPSILON);
        let prompts = client.prompts.lock().unwrap();
        let request = &prompts[0];
        assert_eq!(request.max_output_tokens, 10);
        assert!(request.temperature.abs() < f32::EPSILON);
        assert!(request.prompt.contains(&format!("Gold: {}\n", "g".repeat(100))));
        assert!(request.prompt.contains(&format!("Answer: {}\n", "p".repeat(200))));
    }

    #[tokio::test]
    async fn test_sentinel_and_empty_skip_remote_call() {
        let client = Scripted::new(Ok("YES"));
        let j = judge(client.clone());

        assert!(j.judge("Q?", "deadlock", "").await.abs() < f64::EPSILON);
        assert!(j
            .judge("Q?", "deadlock", "Not found in knowledge base")
            .await
            .abs()
            < f64::EPSILON);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_scores_zero() {
        let client = Scripted::new(Err(()));
        let score = judge(client.clone()).judge("Q?", "deadlock", "a deadlock").await;
        assert!(score.abs() < f64::EPSILON);
        assert_eq!(client.calls(), 1);
    }
}
