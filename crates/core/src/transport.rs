use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// A message as seen from the origin chat: its id plus the id of the
/// message it replies to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub id: i64,
    pub reply_to: Option<i64>,
}

/// Outcome of a forward call. The platform's rate-limit signal is a
/// regular result variant so callers branch on it explicitly instead of
/// catching it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Forwarded { message_id: i64 },
    RateLimited { retry_after: Duration },
}

pub trait Transport: Send + Sync {
    fn provider(&self) -> &'static str;

    fn forward_message<'a>(
        &'a self,
        destination_chat: i64,
        source_chat: i64,
        message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<ForwardOutcome>> + Send + 'a>>;

    fn fetch_message<'a>(
        &'a self,
        chat: i64,
        message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<MessageRef>> + Send + 'a>>;

    fn latest_message_id<'a>(
        &'a self,
        chat: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>>> + Send + 'a>>;

    fn resolve_chat<'a>(
        &'a self,
        reference: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct BotApiTransportConfig {
    pub bot_token: String,
    /// Bot API base, normally `https://api.telegram.org`.
    pub api_base: String,
    /// Base URL of the client gateway that serves message lookups the
    /// Bot API has no method for (getMessage, getLatestMessageId,
    /// resolvePeer). Speaks the same `{ok, result, description}`
    /// envelope as the Bot API.
    pub gateway_base: String,
}

pub struct BotApiTransport {
    config: BotApiTransportConfig,
    client: reqwest::Client,
}

impl BotApiTransport {
    pub fn new(config: BotApiTransportConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn bot_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    fn gateway_url(&self, method: &str) -> String {
        format!("{}/{method}", self.config.gateway_base.trim_end_matches('/'))
    }

    async fn gateway_get<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let res = self
            .client
            .get(self.gateway_url(method))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Telegram {
                // without_url: reqwest errors print the request URL,
                // which for bot methods contains the token.
                message: format!("{method} request failed: {}", e.without_url()),
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| Error::Telegram {
            message: format!("{method} read response failed: {e}"),
        })?;

        if !status.is_success() {
            return Err(Error::Telegram {
                message: format!("{method} http {status}: {body}"),
            });
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| Error::Telegram {
            message: format!("{method} invalid json: {e}; body={body}"),
        })?;

        if !parsed.ok {
            return Err(Error::Telegram {
                message: parsed
                    .description
                    .unwrap_or_else(|| format!("{method} returned ok=false")),
            });
        }

        parsed.result.ok_or_else(|| Error::Telegram {
            message: format!("{method} missing result"),
        })
    }
}

impl Transport for BotApiTransport {
    fn provider(&self) -> &'static str {
        "telegram.botapi"
    }

    fn forward_message<'a>(
        &'a self,
        destination_chat: i64,
        source_chat: i64,
        message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<ForwardOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let res = self
                .client
                .post(self.bot_url("forwardMessage"))
                .json(&serde_json::json!({
                    "chat_id": destination_chat,
                    "from_chat_id": source_chat,
                    "message_id": message_id,
                }))
                .send()
                .await
                .map_err(|e| Error::Telegram {
                    message: format!("forwardMessage request failed: {}", e.without_url()),
                })?;

            let status = res.status();
            let body = res.text().await.map_err(|e| Error::Telegram {
                message: format!("forwardMessage read response failed: {e}"),
            })?;

            // Error statuses still carry the JSON envelope (429 in
            // particular holds retry_after), so parse before checking
            // the status.
            let parsed: ApiResponse<ApiMessage> = match serde_json::from_str(&body) {
                Ok(parsed) => parsed,
                Err(e) if status.is_success() => {
                    return Err(Error::Telegram {
                        message: format!("forwardMessage invalid json: {e}; body={body}"),
                    });
                }
                Err(_) => {
                    return Err(Error::ForwardFailed {
                        message_id,
                        message: format!("http {status}: {body}"),
                    });
                }
            };

            if let Some(retry_after) = parsed
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .filter(|_| status.as_u16() == 429)
            {
                return Ok(ForwardOutcome::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if !status.is_success() || !parsed.ok {
                return Err(Error::ForwardFailed {
                    message_id,
                    message: parsed
                        .description
                        .unwrap_or_else(|| format!("http {status}")),
                });
            }

            let message = parsed.result.ok_or_else(|| Error::Telegram {
                message: "forwardMessage missing result".to_string(),
            })?;

            Ok(ForwardOutcome::Forwarded {
                message_id: message.message_id,
            })
        })
    }

    fn fetch_message<'a>(
        &'a self,
        chat: i64,
        message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<MessageRef>> + Send + 'a>> {
        Box::pin(async move {
            let message: GatewayMessage = self
                .gateway_get(
                    "getMessage",
                    &[
                        ("chat_id", chat.to_string()),
                        ("message_id", message_id.to_string()),
                    ],
                )
                .await?;

            Ok(MessageRef {
                id: message.message_id,
                reply_to: message.reply_to_message_id,
            })
        })
    }

    fn latest_message_id<'a>(
        &'a self,
        chat: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>>> + Send + 'a>> {
        Box::pin(async move {
            let latest: GatewayLatest = self
                .gateway_get("getLatestMessageId", &[("chat_id", chat.to_string())])
                .await?;
            Ok(latest.message_id)
        })
    }

    fn resolve_chat<'a>(
        &'a self,
        reference: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(async move {
            // Numeric references are already canonical chat ids.
            if let Ok(id) = reference.parse::<i64>() {
                return Ok(id);
            }

            let peer: GatewayPeer = self
                .gateway_get("resolvePeer", &[("reference", reference.to_string())])
                .await?;

            // Channel/supergroup peers address as -100<peer_id> in the
            // Bot API chat id space.
            format!("-100{}", peer.peer_id)
                .parse::<i64>()
                .map_err(|_| Error::Telegram {
                    message: format!("resolvePeer returned unusable peer id: {}", peer.peer_id),
                })
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct GatewayMessage {
    message_id: i64,
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GatewayLatest {
    message_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GatewayPeer {
    peer_id: i64,
}
