//! 工具注册表
//!
//! 启动时按名注册 ToolDefinition + ToolHandler，之后只读（Arc 共享给所有轮次，无需加锁）。
//! describe_all 的顺序即注册顺序，每次请求原样发送给主模型。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::schema::{compile_schema, validate_arguments};

/// 工具声明：名称（注册表唯一键）、描述（供 LLM 理解）、参数 JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具能力：invoke(结构化参数) -> 结构化结果
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

/// 自带声明的工具，可直接 register_tool
pub trait Tool: ToolHandler {
    fn definition(&self) -> ToolDefinition;
}

/// 工具注册表：definitions 保持注册顺序，handlers / validators 按名查找
#[derive(Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    validators: HashMap<String, jsonschema::Validator>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；重名返回 Duplicate，参数 schema 无法编译返回 Schema（均为启动期配置错误）
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        if self.handlers.contains_key(&definition.name) {
            return Err(ToolError::Duplicate(definition.name));
        }
        let validator = compile_schema(&definition.parameters).map_err(|reason| ToolError::Schema {
            tool: definition.name.clone(),
            reason,
        })?;
        self.validators.insert(definition.name.clone(), validator);
        self.handlers.insert(definition.name.clone(), handler);
        self.definitions.push(definition);
        Ok(())
    }

    pub fn register_tool(&mut self, tool: impl Tool + 'static) -> Result<(), ToolError> {
        let definition = tool.definition();
        self.register(definition, Arc::new(tool))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>, ToolError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::Unknown(name.to_string()))
    }

    /// 按工具声明的参数 schema 校验
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), ToolError> {
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        validate_arguments(validator, args).map_err(|reason| ToolError::Argument {
            tool: name.to_string(),
            reason,
        })
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn describe_all(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
