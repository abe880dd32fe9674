//! Per-document file activity watcher.
//!
//! Each open document gets its own [`FileActivityWatcher`] that monitors
//! the file's parent directory (non-recursively) and filters raw notify
//! events down to that single file. Raw events pass through the shared
//! [`DebounceGate`] so a burst of writes yields one [`FileChanged`]
//! notification toward the coordinator.
//!
//! The notify callback is kept lightweight: it only filters and forwards
//! through an internal channel to a spawned async task, which consults
//! the gate and performs the channel send, bridging notify's sync
//! callback into async code.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::debounce::DebounceGate;

/// A debounced change notification for a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChanged {
    /// Path of the file that changed on disk.
    pub path: PathBuf,
    /// When the (first) change of the burst was observed.
    pub timestamp: DateTime<Utc>,
}

/// Errors that can occur while creating a file activity watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The file has no parent directory or the directory is missing.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    /// Failed to initialize the underlying file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Watches one file for on-disk changes and emits debounced
/// [`FileChanged`] events.
///
/// Dropping the watcher releases the underlying subscription;
/// [`dispose`](Self::dispose) does the same explicitly and is idempotent.
#[derive(Debug)]
pub struct FileActivityWatcher {
    file_path: PathBuf,

    /// Live notify subscription. `None` once disposed.
    watcher: Option<RecommendedWatcher>,
}

impl FileActivityWatcher {
    /// Creates a watcher for a single file.
    ///
    /// The parent directory is watched non-recursively and events are
    /// filtered to `file_path`. Debounced notifications are delivered
    /// through `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::DirectoryNotFound`] when the file's parent
    /// directory does not exist, or [`WatcherError::WatcherInit`] when
    /// the notify subscription cannot be established.
    pub fn new(
        file_path: PathBuf,
        gate: DebounceGate<PathBuf>,
        tx: mpsc::Sender<FileChanged>,
    ) -> Result<Self> {
        let directory = match file_path.parent() {
            Some(dir) if dir.exists() => dir.to_path_buf(),
            Some(dir) => return Err(WatcherError::DirectoryNotFound(dir.to_path_buf())),
            None => return Err(WatcherError::DirectoryNotFound(file_path.clone())),
        };

        // Internal channel bridging the sync notify callback to async.
        let (raw_tx, raw_rx) = mpsc::channel::<PathBuf>(64);

        let target = file_path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &target, &raw_tx);
            },
            Config::default(),
        )?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tokio::spawn(forward_debounced(raw_rx, gate, tx));

        debug!(
            path = %file_path.display(),
            directory = %directory.display(),
            "File activity watcher created"
        );

        Ok(Self {
            file_path,
            watcher: Some(watcher),
        })
    }

    /// Path of the watched file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Releases the underlying file system subscription.
    ///
    /// Safe to call multiple times; subsequent calls are no-ops.
    pub fn dispose(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            debug!(path = %self.file_path.display(), "File activity watcher disposed");
        }
    }

    /// Whether the subscription has been released.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.watcher.is_none()
    }
}

impl Drop for FileActivityWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Filters a raw notify event down to write-like events on the target
/// file and forwards the path through the internal channel.
///
/// Runs on the notify thread, so it must never block: `try_send` drops
/// the event when the internal channel is full, which the debounce gate
/// would likely have discarded anyway.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    target: &Path,
    raw_tx: &mpsc::Sender<PathBuf>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_)
    ) {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    }

    for path in &event.paths {
        if path != target {
            continue;
        }

        if let Err(e) = raw_tx.try_send(path.clone()) {
            warn!(error = %e, "Failed to queue raw change event");
        }
    }
}

/// Async task that applies the debounce gate and forwards surviving
/// events to the coordinator.
async fn forward_debounced(
    mut raw_rx: mpsc::Receiver<PathBuf>,
    gate: DebounceGate<PathBuf>,
    tx: mpsc::Sender<FileChanged>,
) {
    while let Some(path) = raw_rx.recv().await {
        if !gate.accept(&path).await {
            continue;
        }

        let changed = FileChanged {
            path,
            timestamp: Utc::now(),
        };
        if tx.send(changed).await.is_err() {
            debug!("Change channel closed, stopping forward loop");
            break;
        }
    }
}
