//! 错误类型
//!
//! - ProviderError：主模型 / 评审模型的网络、鉴权、限流、超时与响应格式错误，向调用方传播
//! - ToolError：工具注册与执行错误；执行期错误在 ToolExecutor 边界转为结构化 payload，不会中止本轮
//! - AgentError：启动期错误（配置、人设、工具重名），应使进程初始化失败

use serde_json::json;
use thiserror::Error;

/// 模型提供方错误（主模型与评审模型共用）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider config error: {0}")]
    Config(String),
}

impl ProviderError {
    /// 调用方重试策略使用：仅传输、限流与超时值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::RateLimited(_) | ProviderError::Timeout(_)
        )
    }
}

/// 工具注册 / 解析 / 执行错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    Argument { tool: String, reason: String },

    #[error("Duplicate tool: {0}")]
    Duplicate(String),

    #[error("Invalid parameters schema for {tool}: {reason}")]
    Schema { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    Execution { tool: String, reason: String },

    #[error("Tool timeout: {0}")]
    Timeout(String),
}

impl ToolError {
    /// 回写到对话中的结构化错误，模型可以看到自己的错误调用
    pub fn to_payload(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }
}

/// 启动期错误：配置、人设文本、工具注册、客户端构建
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Persona error: {0}")]
    Persona(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}
