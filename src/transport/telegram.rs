//! Telegram Bot API transport.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::config::TelegramConfig;
use crate::render::{FormattingSpan, SpanStyle};
use crate::retry::retry_delay;

use super::{EditRequest, MessageEvent, Transport, TransportError};

/// Pause after a failed getUpdates call before polling again
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Bot API client speaking `getUpdates` long polling and message edits.
pub struct TelegramTransport {
    client: reqwest::Client,
    base: String,
    poll_timeout: Duration,
    retries: u32,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    channel_post: Option<ApiMessage>,
    edited_channel_post: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message_id: i64,
    chat: ApiChat,
    #[serde(default)]
    text: String,
    #[serde(default)]
    entities: Vec<ApiEntity>,
    #[serde(default)]
    caption: String,
    #[serde(default)]
    caption_entities: Vec<ApiEntity>,
}

#[derive(Debug, Deserialize)]
struct ApiChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiEntity {
    #[serde(rename = "type")]
    kind: String,
    offset: usize,
    length: usize,
    url: Option<String>,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            retries: config.request_retries,
        })
    }

    /// Long-poll for updates and forward channel posts into `events`.
    ///
    /// Runs until the shutdown signal fires or the event channel closes.
    /// Poll failures are transient: logged, waited out, polled again.
    pub async fn run_polling(
        &self,
        events: mpsc::Sender<MessageEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!("update polling started");
        let mut offset = 0i64;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("update polling received shutdown signal");
                    break;
                }
                batch = self.poll_updates(offset) => match batch {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let Some(event) = message_event(update) else {
                                continue;
                            };
                            if events.send(event).await.is_err() {
                                tracing::info!("event channel closed, stopping update polling");
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "getUpdates failed");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        }

        tracing::info!("update polling stopped");
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        let response = self
            .client
            .get(format!("{}/getUpdates", self.base))
            .query(&[
                ("timeout", self.poll_timeout.as_secs() as i64),
                ("offset", offset),
            ])
            // the long poll must outlive the client-wide request timeout
            .timeout(self.poll_timeout + Duration::from_secs(10))
            .send()
            .await?;

        let body: UpdatesResponse = response.json().await?;
        if !body.ok {
            return Err(TransportError::Api(
                body.description
                    .unwrap_or_else(|| "getUpdates rejected".to_string()),
            ));
        }

        Ok(body.result)
    }

    async fn call_edit(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(payload)
            .send()
            .await?;

        // rejections carry a description in the body, not just a status
        let body: ApiResponse = response.json().await?;
        if body.ok {
            Ok(())
        } else {
            Err(TransportError::Api(
                body.description
                    .unwrap_or_else(|| "edit rejected".to_string()),
            ))
        }
    }
}

#[async_trait::async_trait]
impl Transport for TelegramTransport {
    async fn edit_message(&self, request: EditRequest) -> Result<(), TransportError> {
        let (method, field) = if request.is_caption {
            ("editMessageCaption", "caption")
        } else {
            ("editMessageText", "text")
        };

        let mut payload = serde_json::json!({
            "chat_id": request.channel_id,
            "message_id": request.message_id,
            "parse_mode": "HTML",
        });
        payload[field] = serde_json::Value::String(request.rendered_text);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_edit(method, &payload).await {
                Ok(()) => return Ok(()),
                // API-level rejections are not transient, do not retry them
                Err(err @ TransportError::Api(_)) => return Err(err),
                Err(err) if attempt <= self.retries => {
                    let delay = retry_delay(attempt);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "edit request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn message_event(update: Update) -> Option<MessageEvent> {
    let message = update.channel_post.or(update.edited_channel_post)?;

    Some(MessageEvent {
        channel_id: message.chat.id,
        message_id: message.message_id,
        body_text: message.text,
        body_spans: message.entities.iter().filter_map(span_from_entity).collect(),
        caption_text: message.caption,
        caption_spans: message
            .caption_entities
            .iter()
            .filter_map(span_from_entity)
            .collect(),
    })
}

/// Resolve a Telegram entity into a span style, once, at ingestion.
///
/// Entity kinds without a rendering (mentions, hashtags, ...) are dropped.
fn span_from_entity(entity: &ApiEntity) -> Option<FormattingSpan> {
    let style = match entity.kind.as_str() {
        "bold" => SpanStyle::Bold,
        "italic" => SpanStyle::Italic,
        "text_link" => SpanStyle::Link(entity.url.clone()?),
        _ => return None,
    };

    Some(FormattingSpan {
        offset: entity.offset,
        length: entity.length,
        style,
    })
}
