//! 记忆层：对话消息结构与终端会话内的短期历史（不跨会话持久化）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role, ToolCallRequest};
