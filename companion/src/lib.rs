//! Cadwatch Companion - CAD work-session monitor.
//!
//! This crate turns document lifecycle events from a CAD authoring
//! application (open / close / save) plus per-file change notifications
//! into structured work-session records for backend reporting.
//!
//! # Overview
//!
//! The companion receives typed [`types::HostEvent`]s from a
//! [`source::DocumentEventSource`], resolves each file path to a project
//! identity, keeps one debounced file watcher per open document, and
//! drives a per-document session state machine with derived daily
//! statistics and quality classification.
//!
//! # Modules
//!
//! - [`types`]: Host events and normalized document events
//! - [`project`]: Path-pattern project resolution
//! - [`debounce`]: Keyed leading-edge debounce gate
//! - [`watcher`]: Single-file change watcher
//! - [`session`]: Work-session tracking and daily statistics
//! - [`coordinator`]: The monitoring state machine
//! - [`source`]: Host-application event sources
//! - [`processor`]: Document-processing collaborator interface
//! - [`reporter`]: Telemetry reporting to the backend
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for companion operations

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod processor;
pub mod project;
pub mod reporter;
pub mod session;
pub mod source;
pub mod types;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use coordinator::MonitoringCoordinator;
pub use debounce::{DebounceGate, DEFAULT_DEBOUNCE_MS};
pub use error::{MonitorError, Result};
pub use processor::{DocumentProcessor, LoggingProcessor};
pub use project::{ProjectInfo, ProjectPathResolver, ProjectRule};
pub use reporter::{Heartbeat, HttpReporter, SessionSummary, TelemetryReporter};
pub use session::{SessionQuality, WorkSession, WorkSessionTracker};
pub use source::{DocumentEventSource, StdinEventSource};
pub use types::{DocumentEvent, DocumentType, HostEvent, OpenDocument};
pub use watcher::{FileActivityWatcher, FileChanged, WatcherError};
