//! Monitoring coordinator: binds document lifecycle to watcher and
//! session lifecycle.
//!
//! Per file path the coordinator drives `Unmonitored -> Monitored ->
//! Unmonitored`. A monitored path owns exactly one [`DocumentWatcher`]
//! carrying its project identity, its file-change subscription, and
//! its active work session.
//!
//! Concurrency model: the path table is an `RwLock<HashMap>` with the
//! coordinator as the only writer. The run loop routes every event to
//! a per-path ordered task chain, so events for one path process in
//! arrival order while other paths proceed concurrently; a stalled
//! filesystem never freezes unrelated documents. Blocking notify
//! setup/teardown runs on the blocking-thread pool, and collaborator
//! calls (telemetry, document processing) are dispatched as detached
//! tasks whose latency and failures never reach the state machine.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::debounce::DebounceGate;
use crate::processor::DocumentProcessor;
use crate::project::{ProjectInfo, ProjectPathResolver};
use crate::reporter::{Heartbeat, SessionSummary, TelemetryReporter};
use crate::session::{ActivityReason, SessionSeed, WorkSessionTracker};
use crate::source::DocumentEventSource;
use crate::types::{DocumentEvent, DocumentEventType, DocumentType, HostEvent};
use crate::watcher::{FileActivityWatcher, FileChanged};

/// How long shutdown waits for in-flight telemetry before dropping it.
const SHUTDOWN_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat status reported while the coordinator is running.
const STATUS_RUNNING: &str = "RUNNING";

#[derive(Debug)]
struct WatcherStats {
    last_activity: DateTime<Utc>,
    save_count: u32,
}

/// Live association between an open document, its project identity,
/// its file-change subscription, and its work session.
#[derive(Debug)]
pub struct DocumentWatcher {
    file_path: PathBuf,
    file_name: String,
    document_type: DocumentType,
    project: ProjectInfo,
    session_id: uuid::Uuid,
    stats: Mutex<WatcherStats>,
    /// Taken on disposal so Drop never double-releases.
    activity: Mutex<Option<FileActivityWatcher>>,
}

impl DocumentWatcher {
    /// Number of saves seen while monitored.
    pub async fn save_count(&self) -> u32 {
        self.stats.lock().await.save_count
    }

    /// Timestamp of the most recent save or file change.
    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.stats.lock().await.last_activity
    }

    /// Resolved project identity for the monitored file.
    #[must_use]
    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }
}

/// The state machine binding document lifecycle events to watchers and
/// work sessions.
pub struct MonitoringCoordinator {
    engineer: String,
    companion_id: String,
    resolver: ProjectPathResolver,
    sessions: WorkSessionTracker,
    processor: Arc<dyn DocumentProcessor>,
    reporter: Arc<dyn TelemetryReporter>,
    gate: DebounceGate<PathBuf>,
    watchers: Arc<RwLock<HashMap<PathBuf, Arc<DocumentWatcher>>>>,
    change_tx: mpsc::Sender<FileChanged>,
    change_rx: Mutex<Option<mpsc::Receiver<FileChanged>>>,
    /// Cleared on shutdown; no transitions are accepted afterwards.
    accepting: AtomicBool,
    /// Dispatched collaborator tasks still possibly running.
    inflight: Mutex<Vec<JoinHandle<()>>>,
    /// Tail of each path's ordered processing chain.
    chains: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
}

/// One unit of work on a path's ordered chain.
enum QueuedEvent {
    Host(HostEvent),
    FileChanged(FileChanged),
}

impl MonitoringCoordinator {
    /// Creates a coordinator wired to the given collaborators.
    #[must_use]
    pub fn new(
        config: &Config,
        processor: Arc<dyn DocumentProcessor>,
        reporter: Arc<dyn TelemetryReporter>,
    ) -> Self {
        let (change_tx, change_rx) = mpsc::channel(config.channel_capacity);

        Self {
            engineer: config.engineer.clone(),
            companion_id: config.companion_id.clone(),
            resolver: ProjectPathResolver::new(),
            sessions: WorkSessionTracker::new(),
            processor,
            reporter,
            gate: DebounceGate::new(config.debounce_window),
            watchers: Arc::new(RwLock::new(HashMap::new())),
            change_tx,
            change_rx: Mutex::new(Some(change_rx)),
            accepting: AtomicBool::new(true),
            inflight: Mutex::new(Vec::new()),
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Session state owned by this coordinator, for read access.
    #[must_use]
    pub fn sessions(&self) -> &WorkSessionTracker {
        &self.sessions
    }

    /// Number of documents currently monitored.
    pub async fn active_watcher_count(&self) -> usize {
        self.watchers.read().await.len()
    }

    /// Whether a watcher exists for `path`.
    pub async fn is_monitoring(&self, path: &Path) -> bool {
        self.watchers.read().await.contains_key(path)
    }

    /// Watcher entry for `path`, if monitored.
    pub async fn watcher(&self, path: &Path) -> Option<Arc<DocumentWatcher>> {
        self.watchers.read().await.get(path).cloned()
    }

    /// Waits for all dispatched collaborator calls to finish.
    pub async fn quiesce(&self) {
        let handles: Vec<_> = self.inflight.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Spawns a collaborator call without blocking the state machine,
    /// keeping its handle so tests and shutdown can await completion.
    async fn dispatch(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let mut inflight = self.inflight.lock().await;
        inflight.retain(|handle| !handle.is_finished());
        inflight.push(tokio::spawn(fut));
    }

    /// Queues work on `path`'s ordered chain.
    ///
    /// The spawned task first awaits the previous task for the same
    /// path, so same-path events process in arrival order while other
    /// paths proceed concurrently. The run loop only touches the chain
    /// table here and is never blocked by event handling itself.
    async fn enqueue(self: Arc<Self>, path: PathBuf, work: QueuedEvent) {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!("Coordinator shut down, dropping event");
            return;
        }

        let mut chains = self.chains.lock().await;
        chains.retain(|_, handle| !handle.is_finished());

        let previous = chains.remove(&path);
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            match work {
                QueuedEvent::Host(event) => this.handle_event(event).await,
                QueuedEvent::FileChanged(changed) => this.on_file_changed(changed).await,
            }
        });
        chains.insert(path, handle);
    }

    /// Dispatches one host event to the matching transition.
    ///
    /// Events arriving after shutdown are dropped.
    pub async fn handle_event(&self, event: HostEvent) {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!("Coordinator shut down, dropping host event");
            return;
        }

        match event {
            HostEvent::Opened {
                file_path,
                file_name,
                timestamp,
                ..
            } => self.on_opened(file_path, file_name, timestamp).await,
            HostEvent::Closed {
                file_path, timestamp, ..
            } => self.on_closed(&file_path, timestamp).await,
            HostEvent::Saved {
                file_path,
                document_type,
                timestamp,
                is_auto_save,
                ..
            } => {
                self.on_saved(&file_path, document_type, timestamp, is_auto_save)
                    .await;
            }
        }
    }

    async fn on_opened(&self, file_path: String, file_name: String, timestamp: DateTime<Utc>) {
        let path = PathBuf::from(&file_path);

        if self.watchers.read().await.contains_key(&path) {
            warn!(
                path = %path.display(),
                "Document already monitored, ignoring duplicate open"
            );
            return;
        }

        let mut project = self.resolver.resolve(&file_path);
        if !project.is_valid_project {
            warn!(
                path = %path.display(),
                "File outside known project structure, monitoring as unassigned"
            );
            project = ProjectInfo::unassigned();
        }

        // Watcher setup stats the directory and subscribes with the OS;
        // on a slow network share that can stall, so it runs on the
        // blocking-thread pool instead of an async worker.
        let setup = {
            let path = path.clone();
            let gate = self.gate.clone();
            let tx = self.change_tx.clone();
            tokio::task::spawn_blocking(move || FileActivityWatcher::new(path, gate, tx)).await
        };

        let activity = match setup {
            Ok(Ok(watcher)) => watcher,
            Ok(Err(err)) => {
                error!(
                    path = %path.display(),
                    error = %err,
                    "Failed to create file watcher, document will not be monitored"
                );
                return;
            }
            Err(err) => {
                error!(
                    path = %path.display(),
                    error = %err,
                    "Watcher setup task failed, document will not be monitored"
                );
                return;
            }
        };

        let session = self
            .sessions
            .start(SessionSeed {
                file_path: file_path.clone(),
                file_name: file_name.clone(),
                project_id: project.project_id.clone(),
                project_name: project.display_name.clone(),
                engineer: self.engineer.clone(),
                start_time: timestamp,
            })
            .await;

        let watcher = Arc::new(DocumentWatcher {
            file_path: path.clone(),
            file_name,
            document_type: DocumentType::from_path(&path),
            project,
            session_id: session.id,
            stats: Mutex::new(WatcherStats {
                last_activity: timestamp,
                save_count: 0,
            }),
            activity: Mutex::new(Some(activity)),
        });

        self.watchers.write().await.insert(path.clone(), watcher);

        let reporter = Arc::clone(&self.reporter);
        self.dispatch(async move {
            reporter.session_started(&session).await;
        })
        .await;

        let active = self.active_watcher_count().await;
        info!(
            path = %path.display(),
            active,
            "Monitoring document"
        );
    }

    async fn on_closed(&self, file_path: &str, timestamp: DateTime<Utc>) {
        let path = PathBuf::from(file_path);

        let Some(watcher) = self.watchers.write().await.remove(&path) else {
            warn!(
                path = %path.display(),
                "Close for unmonitored document, nothing to release"
            );
            return;
        };

        self.release(&watcher, timestamp).await;
        self.gate.forget(&path).await;

        let active = self.active_watcher_count().await;
        info!(
            path = %path.display(),
            active,
            "Stopped monitoring document"
        );
    }

    /// Releases a watcher's subscription and ends its session. Both
    /// releases run unconditionally; disposal cannot prevent the
    /// session from ending.
    async fn release(&self, watcher: &DocumentWatcher, end_time: DateTime<Utc>) {
        if let Some(activity) = watcher.activity.lock().await.take() {
            // notify teardown touches the filesystem; run it off the
            // async workers. A failed disposal task must not prevent
            // the session from ending.
            let disposed = tokio::task::spawn_blocking(move || {
                let mut activity = activity;
                activity.dispose();
            })
            .await;
            if let Err(err) = disposed {
                warn!(
                    path = %watcher.file_path.display(),
                    error = %err,
                    "Watcher disposal task failed"
                );
            }
        }

        let Some(ended) = self.sessions.end(watcher.session_id, end_time).await else {
            warn!(
                session_id = %watcher.session_id,
                path = %watcher.file_path.display(),
                "No session found for released watcher"
            );
            return;
        };

        let summary = SessionSummary::for_session(&ended);
        let reporter = Arc::clone(&self.reporter);
        self.dispatch(async move {
            reporter.session_ended(&ended, &summary).await;
        })
        .await;
    }

    async fn on_saved(
        &self,
        file_path: &str,
        document_type: DocumentType,
        timestamp: DateTime<Utc>,
        is_auto_save: bool,
    ) {
        let path = PathBuf::from(file_path);

        let Some(watcher) = self.watchers.read().await.get(&path).cloned() else {
            debug!(
                path = %path.display(),
                "Save for unmonitored document ignored"
            );
            return;
        };

        let save_count = {
            let mut stats = watcher.stats.lock().await;
            stats.last_activity = timestamp;
            stats.save_count += 1;
            stats.save_count
        };

        self.sessions
            .record_activity(watcher.session_id, ActivityReason::Save, timestamp)
            .await;

        debug!(
            path = %path.display(),
            saves = save_count,
            auto_save = is_auto_save,
            "Document saved"
        );

        if let Some(session) = self.sessions.session(watcher.session_id).await {
            let reporter = Arc::clone(&self.reporter);
            self.dispatch(async move {
                reporter
                    .session_updated(&session, ActivityReason::Save.as_str())
                    .await;
            })
            .await;
        }

        // BOM extraction is gated to assembly saves; part and drawing
        // saves only update counters. The host event's type decides,
        // not the extension cached at open.
        if document_type == DocumentType::Assembly {
            let event =
                self.document_event(&watcher, DocumentEventType::Saved, document_type, timestamp);
            let processor = Arc::clone(&self.processor);
            self.dispatch(async move {
                processor.process_save(event).await;
            })
            .await;
        }
    }

    /// Handles a debounced file-change notification.
    ///
    /// Changes for paths no longer monitored (a notification racing a
    /// close) are dropped silently.
    pub async fn on_file_changed(&self, changed: FileChanged) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }

        let Some(watcher) = self.watchers.read().await.get(&changed.path).cloned() else {
            debug!(
                path = %changed.path.display(),
                "Change for unmonitored document ignored"
            );
            return;
        };

        watcher.stats.lock().await.last_activity = changed.timestamp;
        self.sessions
            .record_activity(watcher.session_id, ActivityReason::Change, changed.timestamp)
            .await;

        let event = self.document_event(
            &watcher,
            DocumentEventType::Modified,
            watcher.document_type,
            changed.timestamp,
        );
        let processor = Arc::clone(&self.processor);
        self.dispatch(async move {
            processor.process_change(event).await;
        })
        .await;
    }

    fn document_event(
        &self,
        watcher: &DocumentWatcher,
        event_type: DocumentEventType,
        document_type: DocumentType,
        timestamp: DateTime<Utc>,
    ) -> DocumentEvent {
        DocumentEvent {
            file_path: watcher.file_path.to_string_lossy().into_owned(),
            file_name: watcher.file_name.clone(),
            event_type,
            document_type,
            timestamp,
            project_id: watcher.project.project_id.clone(),
            project_name: watcher.project.display_name.clone(),
            engineer: self.engineer.clone(),
        }
    }

    /// Adopts documents already open in the host application by
    /// synthesizing an open transition for each.
    pub async fn reconcile(&self, source: &dyn DocumentEventSource) {
        let open = source.list_open_documents().await;
        if open.is_empty() {
            return;
        }

        info!(count = open.len(), "Adopting documents already open in host");
        for doc in open {
            self.handle_event(HostEvent::Opened {
                file_path: doc.file_path,
                file_name: doc.file_name,
                document_type: doc.document_type,
                timestamp: Utc::now(),
                file_size_bytes: doc.file_size_bytes,
            })
            .await;
        }
    }

    /// Builds and dispatches one heartbeat report.
    pub async fn send_heartbeat(&self) {
        let now = Utc::now();
        let heartbeat = Heartbeat {
            companion_id: self.companion_id.clone(),
            timestamp: now,
            status: STATUS_RUNNING.to_string(),
            active_sessions: self.sessions.active_count().await,
            active_watchers: self.active_watcher_count().await,
            today: self.sessions.daily_statistics(now.date_naive()).await,
        };

        let reporter = Arc::clone(&self.reporter);
        self.dispatch(async move {
            reporter.heartbeat(&heartbeat).await;
        })
        .await;
    }

    /// Runs the event loop until `shutdown` resolves or the host event
    /// stream closes, then drains all active sessions.
    ///
    /// The loop itself never awaits event handling: each event is
    /// queued on its path's ordered chain, so a document on a stalled
    /// filesystem cannot delay events for other documents.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<HostEvent>,
        heartbeat_interval: Duration,
        shutdown: impl Future<Output = ()> + Send,
    ) {
        let Some(mut changes) = self.change_rx.lock().await.take() else {
            error!("Coordinator event loop already running");
            return;
        };

        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        let path = PathBuf::from(event.file_path());
                        Arc::clone(&self)
                            .enqueue(path, QueuedEvent::Host(event))
                            .await;
                    }
                    None => {
                        info!("Host event stream closed");
                        break;
                    }
                },
                Some(changed) = changes.recv() => {
                    let path = changed.path.clone();
                    Arc::clone(&self)
                        .enqueue(path, QueuedEvent::FileChanged(changed))
                        .await;
                }
                _ = heartbeat.tick() => {
                    self.send_heartbeat().await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Stops accepting transitions, ends every active session exactly
    /// once, and releases all watcher subscriptions.
    ///
    /// Failures are isolated per entry: one session failing to release
    /// never blocks finalizing the rest. Idempotent.
    pub async fn shutdown(&self) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }

        // Let queued path chains finish while transitions are still
        // accepted; events already admitted must process, and a close
        // mid-processing must not be raced by the drain pass.
        let pending: Vec<JoinHandle<()>> = self
            .chains
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in pending {
            let _ = handle.await;
        }

        // A concurrent shutdown may have flipped the flag while the
        // chains drained; only one caller runs the release pass.
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<(PathBuf, Arc<DocumentWatcher>)> =
            self.watchers.write().await.drain().collect();

        info!(count = drained.len(), "Draining active sessions");

        let now = Utc::now();
        for (path, watcher) in drained {
            self.release(&watcher, now).await;
            self.gate.forget(&path).await;
            debug!(path = %path.display(), "Released on shutdown");
        }

        if tokio::time::timeout(SHUTDOWN_TELEMETRY_TIMEOUT, self.quiesce())
            .await
            .is_err()
        {
            warn!("Telemetry still in flight at shutdown, dropping");
            for handle in self.inflight.lock().await.drain(..) {
                handle.abort();
            }
        }
    }
}
