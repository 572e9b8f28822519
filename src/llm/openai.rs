//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）：主模型走 OpenAI，评审模型走
//! Gemini 的 OpenAI 兼容端点。请求 / 响应使用本模块的线格式类型（create_byot），
//! 工具调用按 finish_reason == "tool_calls" 判定，不看内容。
//! 适配层只发一次请求：关闭 async_openai 内置的退避重试，重试策略由调用方（RetryingLlmClient）决定。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ProviderError;
use crate::llm::{CompletionResult, JsonResponseFormat, LlmClient};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolDefinition;

const FINISH_TOOL_CALLS: &str = "tool_calls";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    r#type: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: WireFunctionDef<'a>,
}

#[derive(Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct WireResponseFormat<'a> {
    r#type: &'static str,
    json_schema: WireJsonSchema<'a>,
}

#[derive(Serialize)]
struct WireJsonSchema<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config).with_backoff(no_retry()),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: ChatRequest<'_>) -> Result<ResponseChoice, ProviderError> {
        let response: ChatResponse = self
            .client
            .chat()
            .create_byot(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".to_string()))
    }
}

/// max_elapsed_time 为 0：首次失败即把错误交给 map_openai_error
fn no_retry() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::ZERO),
        ..Default::default()
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: m.content.as_deref(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| WireToolCall {
                    id: &tc.id,
                    r#type: "function",
                    function: WireFunctionCall {
                        name: &tc.name,
                        arguments: &tc.arguments,
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.as_deref(),
        })
        .collect()
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|t| WireTool {
            r#type: "function",
            function: WireFunctionDef {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect()
}

/// 按 finish_reason 把响应分成最终文本或工具调用
fn classify(choice: ResponseChoice) -> Result<CompletionResult, ProviderError> {
    let Some(finish) = choice.finish_reason.as_deref() else {
        let has_calls = choice.message.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
        tracing::warn!(has_tool_calls = has_calls, "completion has no finish_reason, treating as final text");
        return Ok(CompletionResult::FinalText(choice.message.content.unwrap_or_default()));
    };
    if finish == FINISH_TOOL_CALLS {
        let calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let id = if tc.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    tc.id
                };
                ToolCallRequest::new(id, tc.function.name, tc.function.arguments)
            })
            .collect();
        if calls.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "finish_reason is tool_calls but no tool calls were returned".to_string(),
            ));
        }
        return Ok(CompletionResult::ToolCallsRequested {
            content: choice.message.content.filter(|c| !c.is_empty()),
            calls,
        });
    }
    if finish != "stop" {
        tracing::warn!(finish_reason = %finish, "completion finished without a normal stop");
    }
    Ok(CompletionResult::FinalText(
        choice.message.content.unwrap_or_default(),
    ))
}

/// 限流可重试；insufficient_quota 同样以 429 返回，但属于永久错误
fn map_openai_error(e: OpenAIError) -> ProviderError {
    let text = e.to_string();
    match e {
        OpenAIError::Reqwest(_) => ProviderError::Transport(text),
        OpenAIError::JSONDeserialize(..) => ProviderError::MalformedResponse(text),
        OpenAIError::ApiError(_) => {
            let lower = text.to_lowercase();
            if lower.contains("insufficient_quota") {
                ProviderError::Api(text)
            } else if lower.contains("rate limit") || lower.contains("rate_limit") {
                ProviderError::RateLimited(text)
            } else {
                ProviderError::Api(text)
            }
        }
        _ => ProviderError::Api(text),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_wire_messages(messages),
            tools: to_wire_tools(tools),
            response_format: None,
        };
        tracing::debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion");
        classify(self.send(request).await?)
    }

    async fn complete_json(
        &self,
        messages: &[Message],
        format: &JsonResponseFormat,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_wire_messages(messages),
            tools: Vec::new(),
            response_format: Some(WireResponseFormat {
                r#type: "json_schema",
                json_schema: WireJsonSchema {
                    name: &format.name,
                    schema: &format.schema,
                    strict: true,
                },
            }),
        };
        tracing::debug!(model = %self.model, schema = %format.name, "structured completion");
        let choice = self.send(request).await?;
        choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("structured reply has no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choice(raw: Value) -> ResponseChoice {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_classify_tool_calls_by_finish_reason() {
        let c = choice(json!({
            "finish_reason": "tool_calls",
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "record_user_details", "arguments": "{\"email\":\"a@b.com\"}"}
                }]
            }
        }));
        match classify(c).unwrap() {
            CompletionResult::ToolCallsRequested { content, calls } => {
                assert!(content.is_none());
                assert_eq!(calls, vec![ToolCallRequest::new(
                    "call_1",
                    "record_user_details",
                    "{\"email\":\"a@b.com\"}"
                )]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_ignores_tool_like_content_on_stop() {
        let c = choice(json!({
            "finish_reason": "stop",
            "message": {"content": "{\"tool\": \"record_user_details\"}"}
        }));
        assert_eq!(
            classify(c).unwrap(),
            CompletionResult::FinalText("{\"tool\": \"record_user_details\"}".into())
        );
    }

    #[test]
    fn test_classify_tool_calls_without_calls_is_malformed() {
        let c = choice(json!({"finish_reason": "tool_calls", "message": {"content": "hm"}}));
        assert!(matches!(classify(c), Err(ProviderError::MalformedResponse(_))));
    }

    #[test]
    fn test_missing_call_id_gets_generated() {
        let c = choice(json!({
            "finish_reason": "tool_calls",
            "message": {"tool_calls": [{"function": {"name": "x", "arguments": "{}"}}]}
        }));
        let CompletionResult::ToolCallsRequested { calls, .. } = classify(c).unwrap() else {
            panic!("expected tool calls");
        };
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_wire_messages_shape() {
        let messages = vec![
            Message::system("sys"),
            Message::assistant_tool_calls(None, vec![ToolCallRequest::new("c1", "t", "{}")]),
            Message::tool_result("c1", "{\"recorded\":\"ok\"}"),
        ];
        let wire = serde_json::to_value(to_wire_messages(&messages)).unwrap();
        assert_eq!(wire[0], json!({"role": "system", "content": "sys"}));
        assert_eq!(wire[1]["content"], Value::Null);
        assert_eq!(wire[1]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[1]["tool_calls"][0]["function"]["name"], "t");
        assert_eq!(wire[2]["tool_call_id"], "c1");
    }

    #[test]
    fn test_missing_finish_reason_is_final_text() {
        let c = choice(json!({"message": {"content": "plain"}}));
        assert_eq!(classify(c).unwrap(), CompletionResult::FinalText("plain".into()));
    }

    mod stub {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        async fn read_request(socket: &mut TcpStream) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= pos + 4 + len {
                        return;
                    }
                }
            }
        }

        /// 每个连接回同一个响应并计数，返回 (api_base, 请求数)
        pub async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            (format!("http://{addr}/v1"), hits)
        }
    }

    async fn complete_once(status: &'static str, body: &'static str) -> (Result<CompletionResult, ProviderError>, usize) {
        let (base, hits) = stub::serve(status, body).await;
        let client = OpenAiClient::new(Some(&base), "gpt-4o-mini", Some("sk-test"));
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            client.complete(&[Message::user("hello")], &[]),
        )
        .await
        .expect("adapter call hung");
        (result, hits.load(std::sync::atomic::Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried_by_adapter() {
        let (result, hits) = complete_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"Rate limit reached for requests","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#,
        )
        .await;
        assert_eq!(hits, 1);
        assert!(matches!(result, Err(ProviderError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_insufficient_quota_is_permanent() {
        let (result, hits) = complete_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","param":null,"code":"insufficient_quota"}}"#,
        )
        .await;
        assert_eq!(hits, 1);
        let err = result.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried_by_adapter() {
        let (result, hits) = complete_once(
            "500 Internal Server Error",
            r#"{"error":{"message":"The server had an error","type":"server_error","param":null,"code":null}}"#,
        )
        .await;
        assert_eq!(hits, 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_success_against_stub() {
        let (result, hits) = complete_once(
            "200 OK",
            r#"{"id":"x","object":"chat.completion","created":0,"model":"gpt-4o-mini","choices":[{"index":0,"finish_reason":"stop","message":{"role":"assistant","content":"hi"}}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .await;
        assert_eq!(hits, 1);
        assert_eq!(result.unwrap(), CompletionResult::FinalText("hi".into()));
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: Vec::new(),
            tools: Vec::new(),
            response_format: None,
        };
        let v = serde_json::to_value(&request).unwrap();
        assert!(v.get("tools").is_none());
        assert!(v.get("response_format").is_none());
    }
}
