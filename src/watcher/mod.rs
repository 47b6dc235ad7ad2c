//! Orchestration of the tracking and rendering pipeline.
//!
//! The watcher consumes inbound message events, decides whether each
//! message is tracked in the template store, and pushes rendered edits
//! back through the transport. A rate-change subscription re-renders
//! every tracked template whenever the cache swaps in new rates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::rates::RateCache;
use crate::render::{format_spans, is_template, Renderer};
use crate::templates::{TemplateStore, TemplateText};
use crate::transport::{EditRequest, MessageEvent, Transport, TransportError};

/// Lifecycle error type
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("watcher already started")]
    AlreadyStarted,

    #[error("watcher is not running")]
    NotRunning,

    #[error("watcher did not stop within {0:?}")]
    StopTimeout(Duration),
}

struct LifecycleState {
    started: bool,
    stopped: bool,
    shutdown: Option<broadcast::Sender<()>>,
    done: Option<oneshot::Receiver<()>>,
}

/// Watches a message stream and keeps price templates live-rendered.
pub struct MessageWatcher {
    store: Arc<TemplateStore>,
    rates: Arc<RateCache>,
    renderer: Renderer,
    transport: Arc<dyn Transport>,
    lifecycle: Mutex<LifecycleState>,
}

impl MessageWatcher {
    pub fn new(
        store: Arc<TemplateStore>,
        rates: Arc<RateCache>,
        renderer: Renderer,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            rates,
            renderer,
            transport,
            lifecycle: Mutex::new(LifecycleState {
                started: false,
                stopped: false,
                shutdown: None,
                done: None,
            }),
        }
    }

    /// Start consuming events.
    ///
    /// Spawns the event loop, subscribes to rate changes and triggers an
    /// initial re-render of everything already tracked. Starting twice is
    /// an error.
    pub fn start(self: Arc<Self>, events: mpsc::Receiver<MessageEvent>) -> Result<(), LifecycleError> {
        let mut state = self.lifecycle.lock().unwrap();
        if state.started {
            return Err(LifecycleError::AlreadyStarted);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        let watcher = Arc::clone(&self);
        tokio::spawn(async move {
            watcher.event_loop(events, shutdown_rx, done_tx).await;
        });

        let watcher = Arc::clone(&self);
        self.rates.register_subscriber(move || {
            let watcher = Arc::clone(&watcher);
            async move { watcher.render_all().await }.boxed()
        });

        let watcher = Arc::clone(&self);
        tokio::spawn(async move {
            watcher.render_all().await;
        });

        state.shutdown = Some(shutdown_tx);
        state.done = Some(done_rx);
        state.started = true;

        Ok(())
    }

    /// Signal the event loop to stop and wait for it, bounded by `timeout`.
    ///
    /// Stopping a watcher that never started, or stopping twice, is an
    /// error; an elapsed grace period reports `StopTimeout` instead of
    /// hanging.
    pub async fn stop(&self, timeout: Duration) -> Result<(), LifecycleError> {
        let done = {
            let mut state = self.lifecycle.lock().unwrap();
            if !state.started || state.stopped {
                return Err(LifecycleError::NotRunning);
            }
            state.stopped = true;

            if let Some(shutdown) = state.shutdown.take() {
                let _ = shutdown.send(());
            }
            state.done.take()
        };

        match done {
            Some(done) => match tokio::time::timeout(timeout, done).await {
                Ok(_) => Ok(()),
                Err(_) => Err(LifecycleError::StopTimeout(timeout)),
            },
            None => Ok(()),
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: mpsc::Receiver<MessageEvent>,
        mut shutdown: broadcast::Receiver<()>,
        done: oneshot::Sender<()>,
    ) {
        tracing::info!("message watcher loop started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        let watcher = Arc::clone(&self);
                        tokio::spawn(async move {
                            watcher.process_event(event).await;
                        });
                    }
                    None => {
                        tracing::info!("inbound event stream closed");
                        break;
                    }
                }
            }
        }

        let _ = done.send(());
        tracing::info!("message watcher loop stopped");
    }

    async fn process_event(&self, event: MessageEvent) {
        let channel_id = event.channel_id;
        let message_id = event.message_id;

        // caption is the message text only when there is no body
        let (raw, spans, is_caption) = if event.body_text.is_empty() {
            (event.caption_text, event.caption_spans, true)
        } else {
            (event.body_text, event.body_spans, false)
        };

        if !is_template(&raw) {
            tracing::debug!(channel_id, message_id, "no price tokens, untracking");
            if let Err(err) = self.store.delete(channel_id, message_id).await {
                tracing::error!(channel_id, message_id, error = %err, "failed to untrack message");
            }
            return;
        }

        let text = TemplateText {
            text: format_spans(&raw, &spans),
            is_caption,
        };

        tracing::info!(channel_id, message_id, is_caption, "tracking price template");
        if let Err(err) = self.store.add(channel_id, message_id, text.clone()).await {
            tracing::error!(channel_id, message_id, error = %err, "failed to track template");
            return;
        }

        if let Err(err) = self.push_render(channel_id, message_id, &text).await {
            tracing::warn!(channel_id, message_id, error = %err, "failed to push rendered message");
        }
    }

    /// Re-render every tracked template with the current rates.
    async fn render_all(&self) {
        let entries = self.store.list().await;
        tracing::debug!(
            count = entries.len(),
            fetched_at = %self.rates.fetched_at(),
            "re-rendering tracked templates"
        );

        for entry in entries {
            if let Err(err) = self
                .push_render(entry.channel_id, entry.message_id, &entry.text)
                .await
            {
                tracing::warn!(
                    channel_id = entry.channel_id,
                    message_id = entry.message_id,
                    error = %err,
                    "failed to refresh rendered message"
                );
            }
        }
    }

    async fn push_render(
        &self,
        channel_id: i64,
        message_id: i64,
        text: &TemplateText,
    ) -> Result<(), TransportError> {
        let rendered = self.renderer.render(&text.text);

        self.transport
            .edit_message(EditRequest {
                channel_id,
                message_id,
                is_caption: text.is_caption,
                rendered_text: rendered,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::tempdir;

    use crate::rates::{RateError, RateSource, RateTable};
    use crate::render::CurrencyPair;

    use super::*;

    struct FixedSource {
        rates: HashMap<String, f64>,
    }

    #[async_trait]
    impl RateSource for FixedSource {
        async fn fetch(&self) -> Result<RateTable, RateError> {
            Ok(RateTable {
                rates: self.rates.clone(),
                source: "fixed".to_string(),
                fetched_at: Utc::now(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        edits: Mutex<Vec<EditRequest>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn edit_message(&self, request: EditRequest) -> Result<(), TransportError> {
            self.edits.lock().unwrap().push(request);
            Ok(())
        }
    }

    struct Fixture {
        watcher: Arc<MessageWatcher>,
        transport: Arc<RecordingTransport>,
        store: Arc<TemplateStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            TemplateStore::open(dir.path().join("templates.json"))
                .await
                .unwrap(),
        );

        let source = FixedSource {
            rates: HashMap::from([("UAH".to_string(), 40.0)]),
        };
        let rates = Arc::new(RateCache::new(Box::new(source), "RUB").await.unwrap());

        let transport = Arc::new(RecordingTransport::default());
        let renderer = Renderer::new(rates.clone(), CurrencyPair::new("UAH", "RUB"));
        let watcher = Arc::new(MessageWatcher::new(
            store.clone(),
            rates,
            renderer,
            transport.clone(),
        ));

        Fixture {
            watcher,
            transport,
            store,
            _dir: dir,
        }
    }

    fn body_event(channel_id: i64, message_id: i64, text: &str) -> MessageEvent {
        MessageEvent {
            channel_id,
            message_id,
            body_text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_template_message_is_tracked_and_edited() {
        let f = fixture().await;

        f.watcher
            .process_event(body_event(1, 2, "Price: $price:10.5"))
            .await;

        let entries = f.store.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text.text, "Price: $price:10.5");

        let edits = f.transport.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].rendered_text, "Price: 10.50₴ (420.00₽)");
        assert!(!edits[0].is_caption);
    }

    #[tokio::test]
    async fn test_plain_message_untracks_existing_key() {
        let f = fixture().await;

        f.watcher.process_event(body_event(1, 2, "$price:1")).await;
        assert_eq!(f.store.count().await, 1);

        f.watcher.process_event(body_event(1, 2, "edited away")).await;
        assert_eq!(f.store.count().await, 0);
    }

    #[tokio::test]
    async fn test_caption_is_used_when_body_empty() {
        let f = fixture().await;

        let event = MessageEvent {
            channel_id: 3,
            message_id: 4,
            caption_text: "photo $price:2".to_string(),
            ..Default::default()
        };
        f.watcher.process_event(event).await;

        let entries = f.store.list().await;
        assert!(entries[0].text.is_caption);

        let edits = f.transport.edits.lock().unwrap();
        assert!(edits[0].is_caption);
    }

    #[tokio::test]
    async fn test_spans_are_resolved_before_storing() {
        let f = fixture().await;

        let event = MessageEvent {
            channel_id: 1,
            message_id: 2,
            body_text: "Sale $price:1".to_string(),
            body_spans: vec![crate::render::FormattingSpan {
                offset: 0,
                length: 4,
                style: crate::render::SpanStyle::Bold,
            }],
            ..Default::default()
        };
        f.watcher.process_event(event).await;

        let entries = f.store.list().await;
        assert_eq!(entries[0].text.text, "<b>Sale</b> $price:1");

        let edits = f.transport.edits.lock().unwrap();
        assert_eq!(edits[0].rendered_text, "<b>Sale</b> 1.00₴ (40.00₽)");
    }

    #[tokio::test]
    async fn test_lifecycle_errors_are_distinct() {
        let f = fixture().await;

        // stop before start
        assert!(matches!(
            f.watcher.stop(Duration::from_secs(1)).await,
            Err(LifecycleError::NotRunning)
        ));

        let (_tx, rx) = mpsc::channel(1);
        f.watcher.clone().start(rx).unwrap();

        // double start
        let (_tx2, rx2) = mpsc::channel(1);
        assert!(matches!(
            f.watcher.clone().start(rx2),
            Err(LifecycleError::AlreadyStarted)
        ));

        f.watcher.stop(Duration::from_secs(2)).await.unwrap();

        // double stop
        assert!(matches!(
            f.watcher.stop(Duration::from_secs(1)).await,
            Err(LifecycleError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_events_flow_through_started_watcher() {
        let f = fixture().await;

        let (tx, rx) = mpsc::channel(8);
        f.watcher.clone().start(rx).unwrap();

        tx.send(body_event(1, 2, "$price:1")).await.unwrap();

        // event processing is fire-and-forget, wait for it to land
        let mut tracked = 0;
        for _ in 0..50 {
            tracked = f.store.count().await;
            if tracked == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(tracked, 1);

        f.watcher.stop(Duration::from_secs(2)).await.unwrap();
    }
}
