//! Chat transport boundary.
//!
//! The watcher only sees this module's event and request types plus the
//! `Transport` trait; the Telegram implementation lives behind it so the
//! core pipeline is testable without the network.

mod telegram;

pub use telegram::TelegramTransport;

use async_trait::async_trait;
use thiserror::Error;

use crate::render::FormattingSpan;

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport rejected request: {0}")]
    Api(String),
}

/// Inbound message observed on a channel.
///
/// Caption fields are used only when the body is empty.
#[derive(Debug, Clone, Default)]
pub struct MessageEvent {
    pub channel_id: i64,
    pub message_id: i64,
    pub body_text: String,
    pub body_spans: Vec<FormattingSpan>,
    pub caption_text: String,
    pub caption_spans: Vec<FormattingSpan>,
}

/// Outbound request to replace a message's rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub channel_id: i64,
    pub message_id: i64,
    pub is_caption: bool,
    pub rendered_text: String,
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn edit_message(&self, request: EditRequest) -> Result<(), TransportError>;
}
