//! 单轮过程事件：供终端 / Web 前端展示阶段变化、工具调用与评审结论

use serde::Serialize;

use crate::core::TurnPhase;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 进入新阶段
    Phase { phase: TurnPhase },
    /// 模型请求调用工具
    ToolCall { id: String, tool: String },
    /// 工具结果已写回对话（ok=false 表示写回的是错误 payload）
    ToolResult { id: String, ok: bool },
    /// 评审结论
    Evaluation { acceptable: bool, feedback: String },
    /// 评审拒绝后已重写回复
    Regenerated,
    /// 工具往返超过上限，放弃本轮
    GaveUp { rounds: usize },
}
