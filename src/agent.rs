//! Headless Agent 运行时
//!
//! 供终端与 HTTP 前端调用的无界面逻辑：
//! create_agent_components 按配置构建主模型、评审模型、通知端、工具注册表与 TurnController，
//! AgentComponents::respond 对单条用户输入跑完整一轮并返回最终回复。

use std::sync::Arc;

use crate::config::{AppConfig, EvaluatorSection, LlmSection};
use crate::core::{AgentError, ProviderError};
use crate::integrations::{create_notifier_from_config, Notifier};
use crate::llm::{LlmClient, OpenAiClient, RetryConfig, RetryingLlmClient};
use crate::memory::Message;
use crate::persona::PersonaContext;
use crate::react::{Critic, TurnController, TurnEvent, TurnOutcome};
use crate::tools::{builtin_registry, ToolExecutor};
use tokio::sync::mpsc::UnboundedSender;

/// 预构建的 Agent 组件：全部只读，可被并发的多轮共享
pub struct AgentComponents {
    pub controller: TurnController,
    pub executor: Arc<ToolExecutor>,
}

impl AgentComponents {
    /// 聊天入口：respond(message, history) -> 最终回复
    pub async fn respond(&self, message: &str, history: &[Message]) -> Result<String, ProviderError> {
        self.controller.respond(message, history).await
    }

    /// 带过程事件的一轮
    pub async fn respond_with_events(
        &self,
        message: &str,
        history: &[Message],
        event_tx: &UnboundedSender<TurnEvent>,
    ) -> Result<TurnOutcome, ProviderError> {
        self.controller.run(message, history, Some(event_tx)).await
    }
}

fn api_key(env_name: &str) -> Option<String> {
    std::env::var(env_name).ok().filter(|k| !k.trim().is_empty())
}

fn wrap(client: OpenAiClient, retry: RetryConfig) -> Arc<dyn LlmClient> {
    Arc::new(RetryingLlmClient::new(Arc::new(client), retry))
}

/// 主模型客户端（外包一层调用方重试 / 超时）；缺少 API Key 视为配置错误
pub fn create_llm_from_config(section: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    let key = api_key(&section.api_key_env)
        .ok_or_else(|| AgentError::Config(format!("{} is not set", section.api_key_env)))?;
    let client = OpenAiClient::new(section.base_url.as_deref(), &section.model, Some(&key));
    tracing::info!(model = %section.model, "primary model configured");
    Ok(wrap(client, section.retry_config()))
}

/// 评审模型客户端；仅 enabled = false 时返回 None。启用但缺少 API Key 与主模型一样视为配置错误
pub fn create_evaluator_llm_from_config(
    section: &EvaluatorSection,
    retry: RetryConfig,
) -> Result<Option<Arc<dyn LlmClient>>, AgentError> {
    if !section.enabled {
        tracing::info!("evaluator disabled by config");
        return Ok(None);
    }
    let key = api_key(&section.api_key_env).ok_or_else(|| {
        AgentError::Config(format!(
            "{} is not set (set [evaluator] enabled = false to run without evaluation)",
            section.api_key_env
        ))
    })?;
    let client = OpenAiClient::new(section.base_url.as_deref(), &section.model, Some(&key));
    tracing::info!(model = %section.model, "evaluator model configured");
    Ok(Some(wrap(client, retry)))
}

/// 由已构建好的客户端与通知端组装组件（测试可传入 Mock）
pub fn assemble_components(
    cfg: &AppConfig,
    persona: PersonaContext,
    llm: Arc<dyn LlmClient>,
    evaluator_llm: Option<Arc<dyn LlmClient>>,
    notifier: Arc<dyn Notifier>,
) -> Result<AgentComponents, AgentError> {
    // 工具重名属于启动期错误，直接让初始化失败
    let registry = Arc::new(builtin_registry(notifier)?);
    let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));
    let persona = Arc::new(persona);

    let mut controller = TurnController::new(llm, executor.clone(), persona.clone())
        .with_max_tool_rounds(cfg.turn.max_tool_rounds);
    if let Some(eval_llm) = evaluator_llm {
        controller = controller.with_critic(Arc::new(Critic::new(eval_llm, &persona)));
    }

    Ok(AgentComponents { controller, executor })
}

/// 按配置创建全部组件
pub fn create_agent_components(
    cfg: &AppConfig,
    persona: PersonaContext,
) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(&cfg.llm)?;
    let evaluator_llm = create_evaluator_llm_from_config(&cfg.evaluator, cfg.llm.retry_config())?;
    let notifier = create_notifier_from_config(&cfg.notify);
    assemble_components(cfg, persona, llm, evaluator_llm, notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_primary_key_is_config_error() {
        let section = LlmSection {
            api_key_env: "PERSONA_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmSection::default()
        };
        assert!(matches!(create_llm_from_config(&section), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_disabled_evaluator() {
        let section = EvaluatorSection {
            enabled: false,
            ..EvaluatorSection::default()
        };
        assert!(matches!(
            create_evaluator_llm_from_config(&section, RetryConfig::default()),
            Ok(None)
        ));
    }

    #[test]
    fn test_enabled_evaluator_without_key_is_config_error() {
        let section = EvaluatorSection {
            enabled: true,
            api_key_env: "PERSONA_TEST_EVALUATOR_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EvaluatorSection::default()
        };
        let result = create_evaluator_llm_from_config(&section, RetryConfig::default());
        assert!(matches!(
            result,
            Err(AgentError::Config(msg)) if msg.contains("PERSONA_TEST_EVALUATOR_KEY_THAT_IS_NEVER_SET")
        ));
    }
}
