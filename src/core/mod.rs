//! 核心类型：错误分类与单轮状态机

pub mod error;
pub mod state;

pub use error::{AgentError, ProviderError, ToolError};
pub use state::{TurnPhase, TurnState};
