//! Template storage with write-through persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;

use super::types::{StoreError, TemplateEntry, TemplateText};

/// channel ID -> (message ID -> template text)
type TemplateMap = HashMap<i64, HashMap<i64, TemplateText>>;

/// Durable store of tracked message templates.
///
/// All operations share one exclusive lock, and the persisted document is
/// rewritten while that lock is held. A mutation that fails to persist
/// rolls the in-memory map back and reports the error, so readers never
/// observe state that is ahead of disk.
pub struct TemplateStore {
    path: PathBuf,
    templates: Mutex<TemplateMap>,
}

impl TemplateStore {
    /// Open the store at `path`.
    ///
    /// A missing document is created empty before the store is usable; a
    /// document that exists but fails to parse is a fatal error rather
    /// than silent data loss.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            templates: Mutex::new(HashMap::new()),
        };

        if tokio::fs::try_exists(&store.path).await? {
            let data = tokio::fs::read(&store.path).await?;
            let loaded: TemplateMap = serde_json::from_slice(&data)?;
            *store.templates.lock().await = loaded;
        } else {
            let templates = store.templates.lock().await;
            store.dump(&templates).await?;
        }

        Ok(store)
    }

    /// Insert or overwrite the template at (channel, message) and persist.
    pub async fn add(
        &self,
        channel_id: i64,
        message_id: i64,
        text: TemplateText,
    ) -> Result<(), StoreError> {
        let mut templates = self.templates.lock().await;
        let previous = templates
            .entry(channel_id)
            .or_default()
            .insert(message_id, text);

        if let Err(err) = self.dump(&templates).await {
            // roll back so memory never diverges from disk
            if let Some(channel) = templates.get_mut(&channel_id) {
                match previous {
                    Some(prev) => {
                        channel.insert(message_id, prev);
                    }
                    None => {
                        channel.remove(&message_id);
                        if channel.is_empty() {
                            templates.remove(&channel_id);
                        }
                    }
                }
            }
            return Err(err);
        }

        Ok(())
    }

    /// Remove the template at (channel, message) if present and persist.
    ///
    /// Deleting an absent key is a successful no-op.
    pub async fn delete(&self, channel_id: i64, message_id: i64) -> Result<(), StoreError> {
        let mut templates = self.templates.lock().await;
        let previous = match templates.get_mut(&channel_id) {
            Some(channel) => channel.remove(&message_id),
            None => None,
        };

        if let Err(err) = self.dump(&templates).await {
            if let Some(prev) = previous {
                templates.entry(channel_id).or_default().insert(message_id, prev);
            }
            return Err(err);
        }

        Ok(())
    }

    /// Snapshot of every tracked template at a single point in time.
    pub async fn list(&self) -> Vec<TemplateEntry> {
        let templates = self.templates.lock().await;

        let mut entries = Vec::new();
        for (&channel_id, messages) in templates.iter() {
            for (&message_id, text) in messages {
                entries.push(TemplateEntry {
                    channel_id,
                    message_id,
                    text: text.clone(),
                });
            }
        }
        entries
    }

    /// Number of tracked templates.
    pub async fn count(&self) -> usize {
        self.templates.lock().await.values().map(HashMap::len).sum()
    }

    async fn dump(&self, templates: &TemplateMap) -> Result<(), StoreError> {
        let data = serde_json::to_vec(templates)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}
