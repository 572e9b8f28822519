//! Persona - 终端聊天
//!
//! 入口：初始化日志、加载配置与人设、创建 Agent，逐行读取用户输入并打印回复。
//! 只有成功完成的一轮才写入会话历史；/reset 清空历史，/quit 退出。

use anyhow::Context;
use persona::{
    config::load_config, create_agent_components, memory::ConversationMemory, observability,
    react::TurnEvent, PersonaContext,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const FAILURE_REPLY: &str = "Sorry, something went wrong while answering. Please try again.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let persona = PersonaContext::from_config(&cfg.app).context("Failed to load persona")?;
    let name = persona.name.clone();
    let agent = create_agent_components(&cfg, persona).context("Failed to create agent")?;
    let mut history = ConversationMemory::new(cfg.app.max_context_turns);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(format!("You are talking to {name}'s assistant. /reset clears history, /quit exits.\n").as_bytes())
        .await?;

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                stdout.write_all(b"(history cleared)\n").await?;
                continue;
            }
            _ => {}
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = agent.respond_with_events(message, history.messages(), &tx).await;
        drop(tx);
        while let Some(ev) = rx.recv().await {
            match ev {
                TurnEvent::ToolCall { tool, .. } => {
                    stdout.write_all(format!("  [tool] {tool}\n").as_bytes()).await?
                }
                TurnEvent::Regenerated => stdout.write_all(b"  [revised after review]\n").await?,
                _ => {}
            }
        }

        match result {
            Ok(outcome) => {
                stdout.write_all(format!("{}\n", outcome.reply).as_bytes()).await?;
                history.push_turn(message, outcome.reply);
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                stdout.write_all(format!("{FAILURE_REPLY}\n").as_bytes()).await?;
            }
        }
    }

    Ok(())
}
