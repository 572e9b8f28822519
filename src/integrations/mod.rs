//! 外部集成：通知侧通道（Pushover 推送 / 仅日志）
//!
//! notify 为尽力而为：发送失败只记 warn 日志，绝不让工具调用或本轮失败。

pub mod pushover;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::NotifySection;

pub use pushover::PushoverNotifier;

/// 通知接收端
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// 只写日志的通知端（未配置推送凭据时使用）
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        tracing::info!(notification = %text, "notify");
    }
}

/// 按 [notify] 配置创建通知端；provider=pushover 但缺少凭据时降级为日志
pub fn create_notifier_from_config(cfg: &NotifySection) -> Arc<dyn Notifier> {
    if cfg.provider.eq_ignore_ascii_case("pushover") {
        let token = std::env::var(&cfg.token_env).ok().filter(|s| !s.is_empty());
        let user = std::env::var(&cfg.user_env).ok().filter(|s| !s.is_empty());
        match (token, user) {
            (Some(token), Some(user)) => {
                return Arc::new(PushoverNotifier::new(&cfg.endpoint, token, user));
            }
            _ => tracing::warn!(
                token_env = %cfg.token_env,
                user_env = %cfg.user_env,
                "Pushover credentials missing, notifications go to the log only"
            ),
        }
    }
    Arc::new(LogNotifier)
}
