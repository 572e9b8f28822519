pub mod contact;
pub mod executor;
pub mod registry;
pub mod schema;

use std::sync::Arc;

use crate::core::ToolError;
use crate::integrations::Notifier;

pub use contact::{RecordUnknownQuestionTool, RecordUserDetailsTool};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolDefinition, ToolHandler, ToolRegistry};
pub use schema::{parameters_schema, validate_arguments};

/// 构建内置工具注册表（record_user_details / record_unknown_question）
pub fn builtin_registry(notifier: Arc<dyn Notifier>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register_tool(RecordUserDetailsTool::new(notifier.clone()))?;
    registry.register_tool(RecordUnknownQuestionTool::new(notifier))?;
    Ok(registry)
}
