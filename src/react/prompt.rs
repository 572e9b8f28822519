//! Prompt 构建：主模型 system prompt、评审 system / user prompt、被拒后的重写 prompt

use crate::memory::{Message, Role};
use crate::persona::PersonaContext;

fn background(persona: &PersonaContext, profile_heading: &str) -> String {
    format!(
        "\n\n## Summary:\n{}\n\n## {}:\n{}\n\n",
        persona.summary, profile_heading, persona.profile
    )
}

/// 主模型 system prompt：以人设身份回答，按需使用两个记录工具
pub fn system_prompt(persona: &PersonaContext) -> String {
    let name = &persona.name;
    let mut prompt = format!(
        "You are acting as {name}. You are answering questions on {name}'s website, \
particularly questions related to {name}'s career, background, skills and experience. \
Your responsibility is to represent {name} for interactions on the website as faithfully as possible. \
You are given a summary of {name}'s background and profile which you can use to answer questions. \
Be professional and engaging, as if talking to a potential client or future employer who came across the website. \
If you don't know the answer to any question, use your record_unknown_question tool to record the question \
that you couldn't answer, even if it's about something trivial or unrelated to career. \
If the user is engaging in discussion, try to steer them towards getting in touch via email; \
ask for their email and record it using your record_user_details tool. \
Never share a phone number or home address; offer email contact only. \
If the user has asked more than 5 questions, recommend continuing the conversation via email."
    );
    prompt.push_str(&background(persona, "Profile"));
    prompt.push_str(&format!(
        "With this context, please chat with the user, always staying in character as {name}."
    ));
    prompt
}

/// 评审 system prompt：与主模型相同的背景资料，独立判断回复质量
pub fn evaluator_system_prompt(persona: &PersonaContext) -> String {
    let name = &persona.name;
    let mut prompt = format!(
        "You are an evaluator that decides whether a response to a question is acceptable. \
You are provided with a conversation between a User and an Agent. Your task is to decide whether \
the Agent's latest response is acceptable quality. \
The Agent is playing the role of {name} and is representing {name} on their website. \
The Agent has been instructed to be professional and engaging, as if talking to a potential client \
or future employer who came across the website. \
Judge the response on your own criteria: tone, factual grounding in the information below, and usefulness. \
Reject responses that invent facts not supported by the background, share a phone number or home address, \
or fail to address the user's message. \
Here is the information you have access to:"
    );
    prompt.push_str(&background(persona, "Profile"));
    prompt.push_str(
        "With this context, please evaluate the latest response, replying with whether the response \
is acceptable and your feedback.",
    );
    prompt
}

/// 评审 user prompt：轮前历史 + 最新用户消息 + 候选回复
pub fn evaluator_user_prompt(reply: &str, message: &str, history: &[Message]) -> String {
    format!(
        "Here's the conversation between the User and the Agent:\n\n{}\n\n\
Here's the latest message from the User:\n\n{}\n\n\
Here's the latest response from the Agent:\n\n{}\n\n\
Please evaluate the response for tone, accuracy, and usefulness, replying with whether it is acceptable and your feedback.",
        render_history(history),
        message,
        reply
    )
}

/// 被拒后重写用的 system prompt：原 prompt + 被拒回答 + 拒绝原因
pub fn rerun_system_prompt(persona: &PersonaContext, rejected: &str, feedback: &str) -> String {
    format!(
        "{}\n\n## Previous answer rejected\nYou just tried to reply, but the quality control rejected your reply\n\
## Your attempted answer:\n{}\n\n## Reason for rejection:\n{}\n\n",
        system_prompt(persona),
        rejected,
        feedback
    )
}

/// 把 user / assistant 历史渲染成评审可读的文本
pub fn render_history(history: &[Message]) -> String {
    let lines: Vec<String> = history
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(format!("User: {}", m.text())),
            Role::Assistant if !m.text().is_empty() => Some(format!("Agent: {}", m.text())),
            _ => None,
        })
        .collect();
    if lines.is_empty() {
        "(no earlier messages)".to_string()
    } else {
        lines.join("\n")
    }
}
