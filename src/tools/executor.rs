//! 工具执行阶段
//!
//! 按请求顺序逐个执行（一一对应、保序），每个结果都带上原请求的 tool_call_id。
//! 未知工具、参数非法、执行失败或超时都转成 `{"error": "..."}` 写回对话，不会中止本轮；
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolError;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::{ToolDefinition, ToolRegistry};

/// 工具执行器：共享只读注册表，对每次调用施加超时
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一组工具调用，返回同样数量、同样顺序的 tool 消息
    pub async fn execute(&self, requests: &[ToolCallRequest]) -> Vec<Message> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let payload = match self.execute_call(request).await {
                Ok(value) => value,
                Err(e) => e.to_payload(),
            };
            results.push(Message::tool_result(request.id.clone(), payload.to_string()));
        }
        results
    }

    /// 执行单个调用：解析 handler → 解析参数 → 按 schema 校验 → 带超时调用
    pub async fn execute_call(&self, request: &ToolCallRequest) -> Result<Value, ToolError> {
        let start = Instant::now();
        let result = self.dispatch(request).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Unknown(_)) => "unknown_tool",
            Err(ToolError::Argument { .. }) => "invalid_arguments",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "call_id": request.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&request.arguments),
        });
        tracing::info!(audit = %audit, "tool");
        if let Err(e) = &result {
            tracing::warn!(tool = %request.name, call_id = %request.id, error = %e, "tool call returned error payload");
        }
        result
    }

    async fn dispatch(&self, request: &ToolCallRequest) -> Result<Value, ToolError> {
        let handler = self.registry.resolve(&request.name)?;
        let args = parse_arguments(&request.name, &request.arguments)?;
        self.registry.validate(&request.name, &args)?;

        match timeout(self.timeout, handler.invoke(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(request.name.clone())),
        }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        self.registry.describe_all()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

/// 模型给出的参数文本 → JSON；空串视为无参数
fn parse_arguments(tool: &str, raw: &str) -> Result<Value, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::Argument {
        tool: tool.to_string(),
        reason: format!("invalid JSON: {e}"),
    })
}

fn args_preview(args: &str) -> String {
    if args.chars().count() > 200 {
        format!("{}...", args.chars().take(200).collect::<String>())
    } else {
        args.to_string()
    }
}
