//! Persona - Rust 个人形象对话代理
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（供终端 / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、单轮状态机
//! - **integrations**: 通知侧通道（Pushover / 日志）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、调用方重试
//! - **memory**: 对话消息结构与终端会话历史
//! - **observability**: 日志初始化
//! - **persona**: 人设资料（背景摘要 + 简历文本）
//! - **react**: Prompt、Critic 评审、单轮响应主循环
//! - **tools**: 工具注册表、参数 Schema、执行阶段与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod persona;
pub mod react;
pub mod tools;

pub use agent::{create_agent_components, AgentComponents};
pub use persona::PersonaContext;
pub use react::{TurnController, TurnOutcome};
