//! Pushover 推送
//!
//! POST https://api.pushover.net/1/messages.json，表单字段 token / user / message。

use async_trait::async_trait;

use crate::integrations::Notifier;

pub const PUSHOVER_ENDPOINT: &str = "https://api.pushover.net/1/messages.json";

pub struct PushoverNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    user: String,
}

impl PushoverNotifier {
    pub fn new(endpoint: &str, token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            token: token.into(),
            user: user.into(),
        }
    }

    async fn send(&self, text: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .form(&[
                ("token", self.token.as_str()),
                ("user", self.user.as_str()),
                ("message", text),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn notify(&self, text: &str) {
        match self.send(text).await {
            Ok(()) => tracing::debug!("pushover notification delivered"),
            Err(e) => tracing::warn!(error = %e, "pushover notification failed"),
        }
    }
}
