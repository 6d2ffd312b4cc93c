// # Telegram Notifier
//
// Sends run summaries and fatal failures to a chat through the bot API.
//
// - Send message: POST `/bot:token/sendMessage` with `{chat_id, text}`
//
// Delivery failures are returned to the caller, which logs them; they never
// decide the outcome of a run.

use async_trait::async_trait;
use ipsync_core::config::NotifierConfig;
use ipsync_core::traits::Notifier;
use ipsync_core::{Error, Result};
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TelegramNotifier {
    /// ⚠️ holds the bot token; NEVER log it
    config: NotifierConfig,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.config.api_base)
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.config.chat_id)
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": message,
            }))
            .send()
            .await
            // reqwest errors carry the URL, which contains the token
            .map_err(|e| Error::http(format!("Telegram request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("telegram", status.as_u16(), "send message", &body));
        }

        tracing::debug!("Notification sent to chat {}", self.config.chat_id);
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn notifier(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(NotifierConfig {
            api_base: server.base_url(),
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_chat_message() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/bot123:abc/sendMessage")
                    .json_body(json!({
                        "chat_id": "42",
                        "text": "edge.example.com: deleted 2/2, created 2/2",
                    }));
                then.status(200).json_body(json!({"ok": true}));
            })
            .await;

        notifier(&server)
            .notify("edge.example.com: deleted 2/2, created 2/2")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_message_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/bot123:abc/sendMessage");
                then.status(400).json_body(json!({"ok": false, "description": "chat not found"}));
            })
            .await;

        assert!(notifier(&server).notify("hello").await.is_err());
    }

    #[test]
    fn token_not_exposed_in_debug() {
        let notifier = TelegramNotifier::new(NotifierConfig {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: "123:secret".to_string(),
            chat_id: "42".to_string(),
        })
        .unwrap();
        assert!(!format!("{:?}", notifier).contains("secret"));
    }
}
