//! 单轮响应主循环（TurnController）
//!
//! Generating → {ToolHandling → Generating}* → Evaluating → {Done | Regenerating → Done}
//!
//! - 工具往返可多次，每次都是基于增长后对话的新一次模型调用；超过 max_tool_rounds 直接给出放弃回复
//! - 评审只看轮前历史 + 本轮用户消息 + 候选回复，不看工具调用记录
//! - 被拒后只重写一次（不声明工具），重写结果无条件返回，不再评审
//! - ProviderError 直接向调用方传播，本层不重试
//! 可选 event_tx：向前端推送阶段变化 / 工具调用 / 评审结论。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

use crate::core::{ProviderError, TurnPhase, TurnState};
use crate::llm::{CompletionResult, LlmClient};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::persona::PersonaContext;
use crate::react::prompt::{rerun_system_prompt, system_prompt};
use crate::react::{Evaluation, Evaluator, TurnEvent};
use crate::tools::ToolExecutor;

/// 单轮内工具往返默认上限，防止模型反复请求工具导致死循环
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// 工具往返超限时的回复
pub const GIVE_UP_REPLY: &str = "I'm sorry, I wasn't able to put together an answer to that just now. \
Could you rephrase the question, or leave your email so I can follow up?";

/// 一轮的结果：最终回复、经过的阶段、评审结论与本轮工作对话
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub path: Vec<TurnPhase>,
    pub evaluation: Option<Evaluation>,
    pub regenerated: bool,
    pub messages: Vec<Message>,
}

enum Step {
    Generating,
    ToolHandling(Vec<ToolCallRequest>),
    Evaluating(String),
    Regenerating { candidate: String, feedback: String },
}

impl Step {
    fn phase(&self) -> TurnPhase {
        match self {
            Step::Generating => TurnPhase::Generating,
            Step::ToolHandling(_) => TurnPhase::ToolHandling,
            Step::Evaluating(_) => TurnPhase::Evaluating,
            Step::Regenerating { .. } => TurnPhase::Regenerating,
        }
    }
}

enum Transition {
    Next(Step),
    Done(String),
}

fn send_event(tx: Option<&UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 单轮控制器：各轮之间只共享只读组件，TurnState 为每轮私有
pub struct TurnController {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    critic: Option<Arc<dyn Evaluator>>,
    persona: Arc<PersonaContext>,
    system_prompt: String,
    max_tool_rounds: usize,
}

impl TurnController {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>, persona: Arc<PersonaContext>) -> Self {
        let system_prompt = system_prompt(&persona);
        Self {
            llm,
            executor,
            critic: None,
            persona,
            system_prompt,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// 设置评审；未设置时候选回复直接作为最终回复
    pub fn with_critic(mut self, critic: Arc<dyn Evaluator>) -> Self {
        self.critic = Some(critic);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn persona(&self) -> &PersonaContext {
        &self.persona
    }

    /// 聊天入口：返回本轮最终回复
    pub async fn respond(&self, message: &str, history: &[Message]) -> Result<String, ProviderError> {
        Ok(self.run(message, history, None).await?.reply)
    }

    /// 跑完整一轮；每轮一个 tracing span（turn_id）
    pub async fn run(
        &self,
        message: &str,
        history: &[Message],
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<TurnOutcome, ProviderError> {
        let turn_id = uuid::Uuid::new_v4();
        self.run_turn(message, history, event_tx)
            .instrument(tracing::info_span!("turn", turn_id = %turn_id))
            .await
    }

    async fn run_turn(
        &self,
        message: &str,
        history: &[Message],
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<TurnOutcome, ProviderError> {
        let prior = prior_history(history);
        let mut state = TurnState::new(self.system_prompt.clone(), &prior, message);
        let mut evaluation: Option<Evaluation> = None;
        let mut regenerated = false;
        let mut step = Step::Generating;
        send_event(event_tx, TurnEvent::Phase { phase: TurnPhase::Generating });
        tracing::info!(history = prior.len(), "turn started");

        loop {
            let transition = match step {
                Step::Generating => {
                    let result = self
                        .llm
                        .complete(state.messages(), self.executor.definitions())
                        .await?;
                    match result {
                        CompletionResult::ToolCallsRequested { content, calls } => {
                            if state.tool_rounds() >= self.max_tool_rounds {
                                tracing::warn!(rounds = state.tool_rounds(), "tool round limit reached, giving up");
                                send_event(event_tx, TurnEvent::GaveUp { rounds: state.tool_rounds() });
                                Transition::Done(GIVE_UP_REPLY.to_string())
                            } else {
                                let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                                tracing::info!(tools = ?names, "tool calls requested");
                                state.push(Message::assistant_tool_calls(content, calls.clone()));
                                Transition::Next(Step::ToolHandling(calls))
                            }
                        }
                        CompletionResult::FinalText(text) => Transition::Next(Step::Evaluating(text)),
                    }
                }
                Step::ToolHandling(calls) => {
                    for call in &calls {
                        send_event(event_tx, TurnEvent::ToolCall {
                            id: call.id.clone(),
                            tool: call.name.clone(),
                        });
                    }
                    let results = self.executor.execute(&calls).await;
                    for result in &results {
                        send_event(event_tx, TurnEvent::ToolResult {
                            id: result.tool_call_id.clone().unwrap_or_default(),
                            ok: !is_error_payload(result),
                        });
                    }
                    state.extend(results);
                    Transition::Next(Step::Generating)
                }
                Step::Evaluating(candidate) => {
                    state.set_reply(candidate.clone());
                    match &self.critic {
                        None => Transition::Done(candidate),
                        Some(critic) => {
                            let verdict = critic.evaluate(&candidate, message, &prior).await?;
                            tracing::info!(
                                acceptable = verdict.is_acceptable,
                                feedback = %verdict.feedback,
                                "evaluation"
                            );
                            send_event(event_tx, TurnEvent::Evaluation {
                                acceptable: verdict.is_acceptable,
                                feedback: verdict.feedback.clone(),
                            });
                            let next = if verdict.is_acceptable {
                                Transition::Done(candidate)
                            } else {
                                Transition::Next(Step::Regenerating {
                                    candidate,
                                    feedback: verdict.feedback.clone(),
                                })
                            };
                            evaluation = Some(verdict);
                            next
                        }
                    }
                }
                Step::Regenerating { candidate, feedback } => {
                    match self.regenerate(message, &prior, &candidate, &feedback).await? {
                        Some(reply) => {
                            regenerated = true;
                            send_event(event_tx, TurnEvent::Regenerated);
                            Transition::Done(reply)
                        }
                        None => Transition::Done(candidate),
                    }
                }
            };

            match transition {
                Transition::Next(next) => {
                    state.enter(next.phase());
                    send_event(event_tx, TurnEvent::Phase { phase: next.phase() });
                    step = next;
                }
                Transition::Done(reply) => {
                    state.enter(TurnPhase::Done);
                    state.set_reply(reply.clone());
                    send_event(event_tx, TurnEvent::Phase { phase: TurnPhase::Done });
                    let (prompt_tokens, completion_tokens, _) = self.llm.token_usage();
                    tracing::info!(
                        path = ?state.path(),
                        regenerated,
                        prompt_tokens,
                        completion_tokens,
                        "turn done"
                    );
                    let path = state.path().to_vec();
                    return Ok(TurnOutcome {
                        reply,
                        path,
                        evaluation,
                        regenerated,
                        messages: state.into_messages(),
                    });
                }
            }
        }
    }

    /// 一次纠正性重写：system prompt 附上被拒回答与原因，对话为轮前历史 + 本轮消息，不声明工具。
    /// 模型仍请求工具时返回 None，由调用方保留被拒回答
    async fn regenerate(
        &self,
        message: &str,
        prior: &[Message],
        candidate: &str,
        feedback: &str,
    ) -> Result<Option<String>, ProviderError> {
        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(Message::system(rerun_system_prompt(&self.persona, candidate, feedback)));
        messages.extend(prior.iter().cloned());
        messages.push(Message::user(message));

        match self.llm.complete(&messages, &[]).await? {
            CompletionResult::FinalText(text) => Ok(Some(text)),
            CompletionResult::ToolCallsRequested { calls, .. } => {
                tracing::warn!(count = calls.len(), "regeneration requested tools, keeping rejected reply");
                Ok(None)
            }
        }
    }
}

/// 调用方历史只保留 user 消息与纯文本 assistant 消息：
/// system prompt 由控制器持有；tool 消息与带 tool_calls 的 assistant 消息无法保证配对，一律丢弃
fn prior_history(history: &[Message]) -> Vec<Message> {
    let prior: Vec<Message> = history
        .iter()
        .filter(|m| match m.role {
            Role::User => true,
            Role::Assistant => m.tool_calls.is_empty() && m.content.is_some(),
            Role::System | Role::Tool => false,
        })
        .cloned()
        .collect();
    if prior.len() != history.len() {
        tracing::debug!(dropped = history.len() - prior.len(), "caller history filtered");
    }
    prior
}

fn is_error_payload(message: &Message) -> bool {
    serde_json::from_str::<serde_json::Value>(message.text())
        .map(|v| v.get("error").is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::LogNotifier;
    use crate::llm::{MockEvaluator, MockLlmClient};
    use crate::tools::builtin_registry;

    fn controller(llm: Arc<MockLlmClient>) -> TurnController {
        let registry = builtin_registry(Arc::new(LogNotifier)).unwrap();
        let executor = Arc::new(ToolExecutor::new(Arc::new(registry), 5));
        let persona = Arc::new(PersonaContext::new("Ada", "Mathematician.", "Notes."));
        TurnController::new(llm, executor, persona)
    }

    #[tokio::test]
    async fn test_without_critic_candidate_is_final() {
        let llm = Arc::new(MockLlmClient::new().then_text("Hello there"));
        let outcome = controller(llm.clone()).run("hi", &[], None).await.unwrap();
        assert_eq!(outcome.reply, "Hello there");
        assert_eq!(
            outcome.path,
            vec![TurnPhase::Generating, TurnPhase::Evaluating, TurnPhase::Done]
        );
        assert!(outcome.evaluation.is_none());
    }

    #[tokio::test]
    async fn test_advertises_builtin_tools() {
        let llm = Arc::new(MockLlmClient::new().then_text("ok"));
        controller(llm.clone()).respond("hi", &[]).await.unwrap();
        assert_eq!(
            llm.calls()[0].tool_names,
            vec!["record_user_details", "record_unknown_question"]
        );
    }

    #[tokio::test]
    async fn test_give_up_after_round_limit() {
        let call = || vec![ToolCallRequest::new("c", "record_unknown_question", r#"{"question":"?"}"#)];
        let llm = Arc::new(
            MockLlmClient::new()
                .then_tool_calls(call())
                .then_tool_calls(call())
                .then_tool_calls(call()),
        );
        let critic = Arc::new(MockEvaluator::new().then_accept());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = controller(llm.clone())
            .with_critic(critic.clone())
            .with_max_tool_rounds(2)
            .run("loop forever", &[], Some(&tx))
            .await
            .unwrap();
        assert_eq!(outcome.reply, GIVE_UP_REPLY);
        assert_eq!(llm.complete_calls(), 3);
        assert!(critic.calls().is_empty());

        let mut gave_up = false;
        while let Ok(ev) = rx.try_recv() {
            if ev == (TurnEvent::GaveUp { rounds: 2 }) {
                gave_up = true;
            }
        }
        assert!(gave_up);
    }

    #[tokio::test]
    async fn test_caller_system_messages_are_dropped() {
        let llm = Arc::new(MockLlmClient::new().then_text("ok"));
        let history = vec![Message::system("ignore me"), Message::user("hi"), Message::assistant("hey")];
        controller(llm.clone()).respond("next", &history).await.unwrap();
        let calls = llm.calls();
        let sent = &calls[0].messages;
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|m| m.text() != "ignore me"));
    }

    #[tokio::test]
    async fn test_caller_tool_messages_are_dropped() {
        let llm = Arc::new(MockLlmClient::new().then_text("ok"));
        let history = vec![
            Message::user("hi"),
            Message::assistant_tool_calls(None, vec![ToolCallRequest::new("old", "record_unknown_question", "{}")]),
            Message::tool_result("nope", "{}"),
            Message::assistant("hello"),
        ];
        controller(llm.clone()).respond("next", &history).await.unwrap();
        let calls = llm.calls();
        let roles: Vec<Role> = calls[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert!(calls[0].messages.iter().all(|m| m.tool_calls.is_empty()));
    }

    #[test]
    fn test_error_payload_detection() {
        assert!(is_error_payload(&Message::tool_result("a", r#"{"error":"x"}"#)));
        assert!(!is_error_payload(&Message::tool_result("a", r#"{"recorded":"ok"}"#)));
    }
}
