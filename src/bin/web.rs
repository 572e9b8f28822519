//! Persona Web 聊天
//!
//! 启动: cargo run --bin persona-web --features web
//! 浏览器访问 http://127.0.0.1:7860
//!
//! 历史由前端保存并随请求发送（服务端不保存会话）；失败的一轮返回通用错误提示，前端不应写入历史。

#![cfg(feature = "web")]

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use persona::config::load_config;
use persona::memory::Message;
use persona::{create_agent_components, observability, AgentComponents, PersonaContext};

const FAILURE_REPLY: &str = "Sorry, something went wrong while answering. Please try again.";

struct AppState {
    agent: AgentComponents,
    persona_name: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct PersonaInfo {
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let persona = PersonaContext::from_config(&cfg.app).context("Failed to load persona")?;
    let persona_name = persona.name.clone();
    let agent = create_agent_components(&cfg, persona).context("Failed to create agent")?;
    let state = Arc::new(AppState { agent, persona_name });

    let app = Router::new()
        .route("/", get(index))
        .route("/api/persona", get(api_persona))
        .route("/api/chat", post(api_chat))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.web.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.web.bind))?;
    tracing::info!(bind = %cfg.web.bind, "persona-web listening");
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

async fn api_persona(State(state): State<Arc<AppState>>) -> Json<PersonaInfo> {
    Json(PersonaInfo {
        name: state.persona_name.clone(),
    })
}

async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "message is required".to_string(),
            }),
        ));
    }

    match state.agent.respond(message, &req.history).await {
        Ok(reply) => Ok(Json(ChatResponse { reply })),
        Err(e) => {
            tracing::error!(error = %e, "turn failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: FAILURE_REPLY.to_string(),
                }),
            ))
        }
    }
}
