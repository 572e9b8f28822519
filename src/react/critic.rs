//! Critic：回复质量评审（独立于主模型的第二个模型）
//!
//! 评审拿到与主模型相同的人设资料，但走自己的 system prompt 与判断标准；
//! 输出必须是 `{"is_acceptable": bool, "feedback": string}`（JSON Schema 约束 + 严格反序列化），
//! 形状不符即 ProviderError::MalformedResponse，不会被当作通过。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::ProviderError;
use crate::llm::{JsonResponseFormat, LlmClient};
use crate::memory::Message;
use crate::persona::PersonaContext;
use crate::react::prompt::{evaluator_system_prompt, evaluator_user_prompt};
use crate::tools::parameters_schema;

/// 评审结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Evaluation {
    /// Whether the agent's latest response is acceptable
    pub is_acceptable: bool,
    /// Why the response was accepted or rejected, and what to improve
    pub feedback: String,
}

/// 评审能力：evaluate(候选回复, 触发的用户消息, 轮前历史) -> Evaluation
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        reply: &str,
        message: &str,
        history: &[Message],
    ) -> Result<Evaluation, ProviderError>;
}

/// 基于 LLM 的评审：持有评审模型客户端与预先渲染好的 system prompt
pub struct Critic {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    format: JsonResponseFormat,
}

impl Critic {
    pub fn new(llm: Arc<dyn LlmClient>, persona: &PersonaContext) -> Self {
        Self {
            llm,
            system_prompt: evaluator_system_prompt(persona),
            format: JsonResponseFormat {
                name: "Evaluation".to_string(),
                schema: parameters_schema::<Evaluation>(),
            },
        }
    }
}

/// 严格解析评审输出；容忍 ```json 代码块包裹
pub fn parse_evaluation(raw: &str) -> Result<Evaluation, ProviderError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| {
        ProviderError::MalformedResponse(format!("evaluation does not match schema: {e}"))
    })
}

#[async_trait]
impl Evaluator for Critic {
    async fn evaluate(
        &self,
        reply: &str,
        message: &str,
        history: &[Message],
    ) -> Result<Evaluation, ProviderError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(evaluator_user_prompt(reply, message, history)),
        ];
        let raw = self.llm.complete_json(&messages, &self.format).await?;
        parse_evaluation(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn persona() -> PersonaContext {
        PersonaContext::new("Ada", "Mathematician.", "")
    }

    #[test]
    fn test_parse_strict_shape() {
        let ok = parse_evaluation(r#"{"is_acceptable": true, "feedback": "fine"}"#).unwrap();
        assert!(ok.is_acceptable);

        let fenced = parse_evaluation("```json\n{\"is_acceptable\": false, \"feedback\": \"rude\"}\n```").unwrap();
        assert_eq!(fenced.feedback, "rude");

        for bad in [
            "Looks acceptable to me!",
            r#"{"is_acceptable": "yes", "feedback": "x"}"#,
            r#"{"is_acceptable": true}"#,
            r#"{"is_acceptable": true, "feedback": "x", "score": 9}"#,
        ] {
            assert!(
                matches!(parse_evaluation(bad), Err(ProviderError::MalformedResponse(_))),
                "accepted malformed evaluation: {bad}"
            );
        }
    }

    #[test]
    fn test_schema_is_closed() {
        let schema = parameters_schema::<Evaluation>();
        assert_eq!(schema["required"], serde_json::json!(["feedback", "is_acceptable"]));
        assert_eq!(schema["additionalProperties"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_critic_sends_structured_request() {
        let llm = Arc::new(
            MockLlmClient::new()
                .then_json(Ok(r#"{"is_acceptable": false, "feedback": "too informal"}"#.into())),
        );
        let critic = Critic::new(llm.clone(), &persona());
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let eval = critic.evaluate("sup", "What do you do?", &history).await.unwrap();
        assert_eq!(
            eval,
            Evaluation {
                is_acceptable: false,
                feedback: "too informal".into()
            }
        );

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].response_format.as_deref(), Some("Evaluation"));
        assert!(calls[0].messages[0].text().contains("You are an evaluator"));
        assert!(calls[0].messages[1].text().contains("sup"));
    }

    #[tokio::test]
    async fn test_critic_propagates_malformed_reply() {
        let llm = Arc::new(MockLlmClient::new().then_json(Ok("ACCEPTABLE".into())));
        let critic = Critic::new(llm, &persona());
        let err = critic.evaluate("x", "y", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
