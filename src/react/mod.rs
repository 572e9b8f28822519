//! 认知层：Prompt、Critic（独立评审）、单轮响应主循环

pub mod critic;
pub mod events;
pub mod loop_;
pub mod prompt;

pub use critic::{parse_evaluation, Critic, Evaluation, Evaluator};
pub use events::TurnEvent;
pub use loop_::{TurnController, TurnOutcome, DEFAULT_MAX_TOOL_ROUNDS, GIVE_UP_REPLY};
