//! Host-application document event sources.
//!
//! A [`DocumentEventSource`] adapts one transport for document
//! lifecycle notifications (opened / closed / saved) into the typed
//! [`HostEvent`] stream the coordinator consumes. The bundled
//! [`StdinEventSource`] reads one JSON event per line from standard
//! input, which is how the CAD-side plugin hands events to this
//! process.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::{HostEvent, OpenDocument};

/// Produces document lifecycle events from the host application.
#[async_trait]
pub trait DocumentEventSource: Send + Sync {
    /// Starts delivering events into `tx`. Returns `false` when the
    /// source cannot attach (already subscribed, transport missing).
    async fn subscribe(&self, tx: mpsc::Sender<HostEvent>) -> bool;

    /// Stops event delivery. Idempotent.
    async fn unsubscribe(&self);

    /// Whether the source is currently delivering events.
    fn is_subscribed(&self) -> bool;

    /// Snapshot of documents already open in the host application,
    /// used at startup to begin monitoring files opened before this
    /// process attached.
    async fn list_open_documents(&self) -> Vec<OpenDocument>;
}

/// Event source reading newline-delimited JSON [`HostEvent`]s from
/// stdin.
///
/// Lines that fail to parse are logged and skipped; a malformed event
/// from the plugin must not kill the stream. Stdin has no notion of a
/// document snapshot, so [`DocumentEventSource::list_open_documents`]
/// always returns an empty list.
#[derive(Debug, Default)]
pub struct StdinEventSource {
    subscribed: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl StdinEventSource {
    /// Creates an unsubscribed stdin source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentEventSource for StdinEventSource {
    async fn subscribe(&self, tx: mpsc::Sender<HostEvent>) -> bool {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            warn!("Already subscribed to stdin events");
            return false;
        }

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<HostEvent>(line) {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    debug!("Event channel closed, stopping stdin reader");
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "Skipping malformed host event");
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Stdin closed, host event stream ended");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "Failed to read from stdin");
                        break;
                    }
                }
            }
        });

        *self.reader_task.lock().await = Some(task);
        info!("Subscribed to host events on stdin");
        true
    }

    async fn unsubscribe(&self) {
        if !self.subscribed.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        info!("Unsubscribed from host events");
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    async fn list_open_documents(&self) -> Vec<OpenDocument> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_unsubscribed() {
        let source = StdinEventSource::new();
        assert!(!source.is_subscribed());
        assert!(source.list_open_documents().await.is_empty());
    }

    #[tokio::test]
    async fn second_subscribe_is_rejected() {
        let source = StdinEventSource::new();
        let (tx, _rx) = mpsc::channel(8);

        assert!(source.subscribe(tx.clone()).await);
        assert!(!source.subscribe(tx).await);
        assert!(source.is_subscribed());

        source.unsubscribe().await;
        assert!(!source.is_subscribed());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let source = StdinEventSource::new();
        source.unsubscribe().await;
        source.unsubscribe().await;
        assert!(!source.is_subscribed());
    }
}
