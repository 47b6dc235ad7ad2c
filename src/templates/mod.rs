//! Durable tracking of messages that contain price templates.
//!
//! The store owns a mapping of (channel, message) to the original,
//! pre-substitution text. The full mapping is rewritten to disk on every
//! mutation while the store lock is held, so a successful call always
//! leaves memory and disk in agreement.

mod store;
mod types;

pub use store::TemplateStore;
pub use types::{StoreError, TemplateEntry, TemplateText};
