//! Mock 客户端（用于测试，无需 API）
//!
//! MockLlmClient 按脚本依次返回补全结果，并记录每次收到的对话与工具声明；
//! MockEvaluator 按脚本依次返回评审结论。脚本耗尽时返回 ProviderError::Api。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::ProviderError;
use crate::llm::{CompletionResult, JsonResponseFormat, LlmClient};
use crate::memory::{Message, ToolCallRequest};
use crate::react::{Evaluation, Evaluator};
use crate::tools::ToolDefinition;

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    /// complete_json 调用时为 schema 名称
    pub response_format: Option<String>,
}

/// 脚本化 LLM 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    completions: Mutex<VecDeque<Result<CompletionResult, ProviderError>>>,
    json_replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn exhausted() -> ProviderError {
    ProviderError::Api("mock script exhausted".to_string())
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, result: Result<CompletionResult, ProviderError>) -> Self {
        if let Ok(mut q) = self.completions.lock() {
            q.push_back(result);
        }
        self
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(Ok(CompletionResult::FinalText(text.into())))
    }

    pub fn then_tool_calls(self, calls: Vec<ToolCallRequest>) -> Self {
        self.then(Ok(CompletionResult::ToolCallsRequested {
            content: None,
            calls,
        }))
    }

    pub fn then_error(self, error: ProviderError) -> Self {
        self.then(Err(error))
    }

    /// complete_json 的下一条回复
    pub fn then_json(self, reply: Result<String, ProviderError>) -> Self {
        if let Ok(mut q) = self.json_replies.lock() {
            q.push_back(reply);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// complete（非结构化）被调用的次数
    pub fn complete_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.response_format.is_none())
            .count()
    }

    fn record(&self, messages: &[Message], tools: &[ToolDefinition], format: Option<&str>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                response_format: format.map(String::from),
            });
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, ProviderError> {
        self.record(messages, tools, None);
        self.completions
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(exhausted()))
    }

    async fn complete_json(
        &self,
        messages: &[Message],
        format: &JsonResponseFormat,
    ) -> Result<String, ProviderError> {
        self.record(messages, &[], Some(&format.name));
        self.json_replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(exhausted()))
    }
}

/// 评审调用记录：(候选回复, 用户消息, 历史条数)
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorCall {
    pub reply: String,
    pub message: String,
    pub history_len: usize,
}

/// 脚本化评审
#[derive(Debug, Default)]
pub struct MockEvaluator {
    verdicts: Mutex<VecDeque<Result<Evaluation, ProviderError>>>,
    calls: Mutex<Vec<EvaluatorCall>>,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, verdict: Result<Evaluation, ProviderError>) -> Self {
        if let Ok(mut q) = self.verdicts.lock() {
            q.push_back(verdict);
        }
        self
    }

    pub fn then_accept(self) -> Self {
        self.then(Ok(Evaluation {
            is_acceptable: true,
            feedback: "Looks good".to_string(),
        }))
    }

    pub fn then_reject(self, feedback: impl Into<String>) -> Self {
        self.then(Ok(Evaluation {
            is_acceptable: false,
            feedback: feedback.into(),
        }))
    }

    pub fn calls(&self) -> Vec<EvaluatorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Evaluator for MockEvaluator {
    async fn evaluate(
        &self,
        reply: &str,
        message: &str,
        history: &[Message],
    ) -> Result<Evaluation, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(EvaluatorCall {
                reply: reply.to_string(),
                message: message.to_string(),
                history_len: history.len(),
            });
        }
        self.verdicts
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(exhausted()))
    }
}
