//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：
//! - complete：带工具声明的对话补全，按 finish_reason 区分「最终文本」与「请求工具调用」
//! - complete_json：按 JSON Schema 约束输出（评审模型使用）
//!
//! 适配器本身不重试；RetryingLlmClient 是调用方的重试 / 超时策略，可包在任意客户端外面。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ProviderError;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolDefinition;

/// 一次补全的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    /// 模型给出最终回复
    FinalText(String),
    /// 模型请求调用工具（content 为同一条消息里可能附带的文本）
    ToolCallsRequested {
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

/// 结构化输出格式：schema 名称 + JSON Schema
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponseFormat {
    pub name: String,
    pub schema: Value,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 对话补全；tools 为空时不向模型声明任何工具
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, ProviderError>;

    /// 结构化补全，返回模型输出的 JSON 文本（由调用方按类型解析）
    async fn complete_json(
        &self,
        messages: &[Message],
        format: &JsonResponseFormat,
    ) -> Result<String, ProviderError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 调用方重试策略：每次请求的截止时间 + 可重试错误的指数退避
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            request_timeout_secs: 60,
        }
    }
}

/// 带超时与重试的客户端包装；超时记为 ProviderError::Timeout
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn guarded<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
        T: Send,
    {
        let deadline = Duration::from_secs(self.config.request_timeout_secs);
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(deadline, call()).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout(self.config.request_timeout_secs)),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.base_delay_ms.saturating_mul(1u64 << attempt.min(10));
                    tracing::warn!(op, attempt, delay_ms = delay, error = %e, "provider call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, ProviderError> {
        self.guarded("complete", || self.inner.complete(messages, tools)).await
    }

    async fn complete_json(
        &self,
        messages: &[Message],
        format: &JsonResponseFormat,
    ) -> Result<String, ProviderError> {
        self.guarded("complete_json", || self.inner.complete_json(messages, format))
            .await
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
