//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockEvaluator, MockLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{CompletionResult, JsonResponseFormat, LlmClient, RetryConfig, RetryingLlmClient};
