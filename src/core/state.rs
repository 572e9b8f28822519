//! 单轮状态：TurnPhase 状态机阶段与 TurnState 工作对话
//!
//! TurnState 由 TurnController 在一轮开始时创建、独占，轮次结束即丢弃；
//! path 记录经过的阶段，用于日志与确定性校验。

use serde::Serialize;

use crate::memory::Message;

/// 轮次阶段：Generating → {ToolHandling → Generating} → Evaluating → {Done | Regenerating → Done}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Generating,
    ToolHandling,
    Evaluating,
    Regenerating,
    Done,
}

/// 一轮内的工作状态：追加式对话、终止标记、最近一次回复
#[derive(Clone, Debug)]
pub struct TurnState {
    messages: Vec<Message>,
    done: bool,
    last_reply: Option<String>,
    path: Vec<TurnPhase>,
    tool_rounds: usize,
}

impl TurnState {
    /// 初始对话 = system + 历史 + 新用户消息，阶段为 Generating
    pub fn new(system_prompt: String, history: &[Message], user_message: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_message));
        Self {
            messages,
            done: false,
            last_reply: None,
            path: vec![TurnPhase::Generating],
            tool_rounds: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn enter(&mut self, phase: TurnPhase) {
        if phase == TurnPhase::ToolHandling {
            self.tool_rounds += 1;
        }
        if phase == TurnPhase::Done {
            self.done = true;
        }
        self.path.push(phase);
    }

    pub fn phase(&self) -> TurnPhase {
        self.path.last().copied().unwrap_or(TurnPhase::Generating)
    }

    pub fn path(&self) -> &[TurnPhase] {
        &self.path
    }

    pub fn tool_rounds(&self) -> usize {
        self.tool_rounds
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn set_reply(&mut self, reply: impl Into<String>) {
        self.last_reply = Some(reply.into());
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    /// 结束本轮，取出工作对话
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_conversation_layout() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let state = TurnState::new("persona".into(), &history, "what do you do?");
        let roles: Vec<_> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                crate::memory::Role::System,
                crate::memory::Role::User,
                crate::memory::Role::Assistant,
                crate::memory::Role::User
            ]
        );
        assert_eq!(state.phase(), TurnPhase::Generating);
        assert!(!state.is_done());
    }

    #[test]
    fn test_enter_tracks_rounds_and_done() {
        let mut state = TurnState::new("p".into(), &[], "q");
        state.enter(TurnPhase::ToolHandling);
        state.enter(TurnPhase::Generating);
        state.enter(TurnPhase::ToolHandling);
        state.enter(TurnPhase::Done);
        assert_eq!(state.tool_rounds(), 2);
        assert!(state.is_done());
        assert_eq!(state.path().len(), 5);
    }
}
