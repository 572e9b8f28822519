//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PERSONA__*` 覆盖（双下划线表示嵌套，如 `PERSONA__LLM__MODEL=gpt-4o`）。
//! API Key 与推送凭据不写入配置文件，配置里只保存环境变量名。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub evaluator: EvaluatorSection,
    pub tools: ToolsSection,
    pub turn: TurnSection,
    pub notify: NotifySection,
    pub web: WebSection,
}

/// [app] 段：人设名称与资料目录、终端会话保留轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub persona_dir: PathBuf,
    pub summary_file: String,
    pub profile_file: String,
    /// 对话历史保留轮数（终端会话短期记忆）
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Shailesh Kumar".to_string(),
            persona_dir: PathBuf::from("me"),
            summary_file: "summary.txt".to_string(),
            profile_file: "profile.txt".to_string(),
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：主模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求截止时间（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
        }
    }
}

impl LlmSection {
    /// 主模型与评审模型共用的重试 / 超时策略
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay_ms: self.retry.base_delay_ms,
            request_timeout_secs: self.timeouts.request,
        }
    }
}

/// [evaluator] 段：独立评审模型（默认 Gemini 的 OpenAI 兼容端点）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluatorSection {
    pub enabled: bool,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.0-flash".to_string(),
            base_url: Some("https://generativelanguage.googleapis.com/v1beta/openai/".to_string()),
            api_key_env: "GOOGLE_API_KEY".to_string(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [turn] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurnSection {
    /// 单轮内工具往返上限，超出后直接给出放弃回复
    pub max_tool_rounds: usize,
}

impl Default for TurnSection {
    fn default() -> Self {
        Self { max_tool_rounds: 8 }
    }
}

/// [notify] 段：provider = pushover / log
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub provider: String,
    pub token_env: String,
    pub user_env: String,
    pub endpoint: String,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            provider: "pushover".to_string(),
            token_env: "PUSHOVER_TOKEN".to_string(),
            user_env: "PUSHOVER_USER".to_string(),
            endpoint: crate::integrations::pushover::PUSHOVER_ENDPOINT.to_string(),
        }
    }
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub bind: String,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7860".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 PERSONA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PERSONA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PERSONA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.evaluator.model, "gemini-2.0-flash");
        assert!(cfg.evaluator.enabled);
        assert_eq!(cfg.turn.max_tool_rounds, 8);
        assert_eq!(cfg.llm.retry_config().request_timeout_secs, 60);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[app]\nname = \"Ada Lovelace\"\n\n[turn]\nmax_tool_rounds = 3\n\n[evaluator]\nenabled = false\n"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.name, "Ada Lovelace");
        assert_eq!(cfg.turn.max_tool_rounds, 3);
        assert!(!cfg.evaluator.enabled);
        // 未出现的键保持默认
        assert_eq!(cfg.app.summary_file, "summary.txt");
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }
}
