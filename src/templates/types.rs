//! Template types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-specific error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("template document I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed template document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Text of a tracked message, markup-resolved but pre-substitution.
///
/// The caption flag decides which field of the message the rendered text
/// is written back into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateText {
    pub text: String,
    #[serde(default)]
    pub is_caption: bool,
}

/// A tracked template together with its composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub channel_id: i64,
    pub message_id: i64,
    pub text: TemplateText,
}
