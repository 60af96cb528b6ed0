//! Remote LLM client for judging and full-context answers.

pub mod gemini;
pub mod rate_limiter;
pub mod retry;
pub mod types;

pub use gemini::{truncate_chars, GeminiClient};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
