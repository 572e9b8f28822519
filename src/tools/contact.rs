//! 内置工具：记录用户联系方式 / 记录无法回答的问题
//!
//! 两者都只通过通知端产生副作用，并且无论通知是否送达都向对话返回 `{"recorded": "ok"}`。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::ToolError;
use crate::integrations::Notifier;
use crate::tools::schema::parameters_schema;
use crate::tools::{Tool, ToolDefinition, ToolHandler};

pub const RECORD_USER_DETAILS: &str = "record_user_details";
pub const RECORD_UNKNOWN_QUESTION: &str = "record_unknown_question";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UserDetailsArgs {
    /// The email address of this user
    pub email: String,
    /// The user's name, if they provided it
    #[serde(default)]
    pub name: Option<String>,
    /// Additional info about the conversation
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UnknownQuestionArgs {
    /// The question that couldn't be answered
    pub question: String,
}

fn decode<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Argument {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn recorded() -> Value {
    json!({ "recorded": "ok" })
}

/// record_user_details：用户留下邮箱时推送通知
pub struct RecordUserDetailsTool {
    notifier: Arc<dyn Notifier>,
}

impl RecordUserDetailsTool {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl ToolHandler for RecordUserDetailsTool {
    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: UserDetailsArgs = decode(RECORD_USER_DETAILS, args)?;
        let name = args.name.as_deref().unwrap_or("Name not provided");
        let notes = args.notes.as_deref().unwrap_or("not provided");
        self.notifier
            .notify(&format!(
                "Recording {} with email {} and notes {}",
                name, args.email, notes
            ))
            .await;
        Ok(recorded())
    }
}

impl Tool for RecordUserDetailsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: RECORD_USER_DETAILS.to_string(),
            description: "Use this tool to record that a user is interested in being in touch and provided an email address".to_string(),
            parameters: parameters_schema::<UserDetailsArgs>(),
        }
    }
}

/// record_unknown_question：记录答不上来的问题
pub struct RecordUnknownQuestionTool {
    notifier: Arc<dyn Notifier>,
}

impl RecordUnknownQuestionTool {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl ToolHandler for RecordUnknownQuestionTool {
    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: UnknownQuestionArgs = decode(RECORD_UNKNOWN_QUESTION, args)?;
        self.notifier
            .notify(&format!("Recording {}", args.question))
            .await;
        Ok(recorded())
    }
}

impl Tool for RecordUnknownQuestionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: RECORD_UNKNOWN_QUESTION.to_string(),
            description: "Always use this tool to record any question that couldn't be answered".to_string(),
            parameters: parameters_schema::<UnknownQuestionArgs>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn test_user_details_defaults() {
        let recorder = Arc::new(Recorder::default());
        let tool = RecordUserDetailsTool::new(recorder.clone());
        let out = tool.invoke(json!({"email": "a@b.com"})).await.unwrap();
        assert_eq!(out, json!({"recorded": "ok"}));
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            ["Recording Name not provided with email a@b.com and notes not provided"]
        );
    }

    #[tokio::test]
    async fn test_unknown_question_notifies() {
        let recorder = Arc::new(Recorder::default());
        let tool = RecordUnknownQuestionTool::new(recorder.clone());
        tool.invoke(json!({"question": "Favourite colour?"})).await.unwrap();
        assert_eq!(recorder.0.lock().unwrap()[0], "Recording Favourite colour?");
    }

    #[test]
    fn test_definitions_advertise_required_fields() {
        let tool = RecordUserDetailsTool::new(Arc::new(Recorder::default()));
        let def = tool.definition();
        assert_eq!(def.name, "record_user_details");
        assert_eq!(def.parameters["required"], json!(["email"]));
        assert_eq!(def.parameters["additionalProperties"], json!(false));
        assert!(def.parameters["properties"].get("notes").is_some());
    }
}
