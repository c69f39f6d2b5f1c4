//! Bot API transport over HTTPS long-polling

use async_trait::async_trait;
use curfew_api::{Action, InboundEvent, Keyboard, OutboundMessage};
use curfew_config::ChannelConfig;
use curfew_util::{ChatId, MessageId, OperatorId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{BotIdentity, ChannelError, ChannelResult, ChatTransport, Polled};

const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

/// Bot API client
pub struct TelegramTransport {
    http: Client,
    /// `<base>/bot<token>`; never logged
    endpoint: String,
}

impl TelegramTransport {
    pub fn new(config: &ChannelConfig) -> ChannelResult<Self> {
        // Long-poll requests legitimately take up to the poll timeout
        let http = Client::builder()
            .timeout(config.poll_timeout + config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", config.api_base_url, config.bot_token.expose()),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> ChannelResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoint, method);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(redact)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(redact)?;

        let reply: ApiReply<T> = match serde_json::from_slice(&bytes) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(ChannelError::Api {
                    code: status.as_u16(),
                    description: status.canonical_reason().unwrap_or("unknown").to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match reply {
            ApiReply {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiReply {
                error_code,
                description,
                ..
            } => Err(ChannelError::Api {
                code: error_code.unwrap_or_else(|| status.as_u16()),
                description: description.unwrap_or_default(),
            }),
        }
    }
}

/// The request URL embeds the bot token
fn redact(error: reqwest::Error) -> ChannelError {
    ChannelError::Http(error.without_url())
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn handshake(&self) -> ChannelResult<BotIdentity> {
        let me: WireUser = self.call("getMe", &serde_json::json!({})).await?;
        Ok(BotIdentity {
            id: me.id,
            username: me.username.unwrap_or_default(),
        })
    }

    async fn poll(&self, offset: i64, timeout: Duration) -> ChannelResult<Vec<Polled>> {
        let request = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        let raw: Vec<serde_json::Value> = self.call("getUpdates", &request).await?;
        Ok(decode_updates(raw))
    }

    async fn send(&self, message: &OutboundMessage) -> ChannelResult<MessageId> {
        let reply_markup = message.keyboard.as_ref().map(WireKeyboard::from);

        if let Some(target) = message.replace {
            let request = EditMessage {
                chat_id: message.chat.get(),
                message_id: target.get(),
                text: &message.text,
                reply_markup: reply_markup.as_ref(),
            };
            match self
                .call::<_, serde_json::Value>("editMessageText", &request)
                .await
            {
                Ok(_) => return Ok(target),
                Err(ChannelError::Api { code: 400, description })
                    if description.contains("message is not modified") =>
                {
                    return Ok(target);
                }
                Err(ChannelError::Api { code: 400, description }) => {
                    debug!(%description, "Edit rejected, sending a new message");
                }
                Err(e) => return Err(e),
            }
        }

        let request = SendMessage {
            chat_id: message.chat.get(),
            text: &message.text,
            reply_markup: reply_markup.as_ref(),
        };
        let sent: WireMessage = self.call("sendMessage", &request).await?;
        Ok(MessageId::new(sent.message_id))
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()> {
        let request = AnswerCallback {
            callback_query_id: callback_id,
            text,
        };
        let _: bool = self.call("answerCallbackQuery", &request).await?;
        Ok(())
    }
}

/// Decode a `getUpdates` result one update at a time, so one bad update
/// cannot hide the rest of the batch.
pub fn decode_updates(raw: Vec<serde_json::Value>) -> Vec<Polled> {
    raw.into_iter()
        .filter_map(|value| {
            let Some(update_id) = value.get("update_id").and_then(|v| v.as_i64()) else {
                warn!("Dropping update without update_id");
                return None;
            };

            let event = serde_json::from_value::<WireUpdate>(value)
                .map_err(|e| ChannelError::Malformed {
                    update_id,
                    reason: e.to_string(),
                })
                .and_then(into_event);

            Some(Polled { update_id, event })
        })
        .collect()
}

fn into_event(update: WireUpdate) -> ChannelResult<Option<InboundEvent>> {
    if let Some(message) = update.message {
        let (Some(from), Some(text)) = (message.from, message.text) else {
            return Ok(None);
        };
        return Ok(Some(InboundEvent::Text {
            operator: OperatorId::new(from.id),
            chat: ChatId::new(message.chat.id),
            message: MessageId::new(message.message_id),
            text,
        }));
    }

    if let Some(query) = update.callback_query {
        let malformed = |reason: String| ChannelError::Malformed {
            update_id: update.update_id,
            reason,
        };

        let data = query
            .data
            .ok_or_else(|| malformed("callback query without data".into()))?;
        let action: Action = data
            .parse()
            .map_err(|e| malformed(format!("{}: {:?}", e, data)))?;

        let operator = OperatorId::new(query.from.id);
        let (chat, message) = match query.message {
            Some(m) => (ChatId::new(m.chat.id), Some(MessageId::new(m.message_id))),
            None => (ChatId::from(operator), None),
        };

        return Ok(Some(InboundEvent::Button {
            operator,
            chat,
            message,
            callback_id: query.id,
            action,
        }));
    }

    Ok(None)
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallback>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    from: Option<WireUser>,
    chat: WireChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireCallback {
    id: String,
    from: WireUser,
    message: Option<WireMessage>,
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a WireKeyboard>,
}

#[derive(Debug, Serialize)]
struct EditMessage<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a WireKeyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallback<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireKeyboard {
    inline_keyboard: Vec<Vec<WireButton>>,
}

#[derive(Debug, Serialize)]
struct WireButton {
    text: String,
    callback_data: String,
}

impl From<&Keyboard> for WireKeyboard {
    fn from(keyboard: &Keyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| WireButton {
                            text: b.label.clone(),
                            callback_data: b.action.encode(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}
