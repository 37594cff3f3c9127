use relay_forward_core::{Error, Result};
use serde::Deserialize;

/// Minimal Bot API client for the command layer: long-poll updates and
/// plain-text replies. Forwarding and message lookups go through the
/// core transport instead.
pub struct BotClient {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl BotClient {
    pub fn new(api_base: &str, bot_token: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let res = self
            .client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Telegram {
                message: format!("getUpdates request failed: {}", e.without_url()),
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| Error::Telegram {
            message: format!("getUpdates read response failed: {}", e.without_url()),
        })?;

        if !status.is_success() {
            return Err(Error::Telegram {
                message: format!("getUpdates http {status}: {body}"),
            });
        }

        let parsed: ApiResponse<Vec<Update>> =
            serde_json::from_str(&body).map_err(|e| Error::Telegram {
                message: format!("getUpdates invalid json: {e}"),
            })?;

        if !parsed.ok {
            return Err(Error::Telegram {
                message: parsed
                    .description
                    .unwrap_or_else(|| "getUpdates returned ok=false".to_string()),
            });
        }

        Ok(parsed.result.unwrap_or_default())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<()> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(reply_to) = reply_to_message_id {
            payload["reply_to_message_id"] = serde_json::json!(reply_to);
        }

        let res = self
            .client
            .post(self.url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Telegram {
                message: format!("sendMessage request failed: {}", e.without_url()),
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Telegram {
                message: format!("sendMessage http {status}: {body}"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub text: Option<String>,
    pub chat: Chat,
    pub from: Option<User>,
    pub reply_to_message: Option<Box<IncomingMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}
