//! Document-processing collaborator interface.
//!
//! The real processor (BOM extraction against the host CAD application)
//! lives outside this crate; the coordinator only depends on this trait.
//! Calls are fire-and-forget from the coordinator's perspective:
//! implementations own their failures.

use async_trait::async_trait;
use tracing::debug;

use crate::types::DocumentEvent;

/// Consumes normalized document events for downstream processing.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Handles a debounced on-disk modification of a monitored file.
    async fn process_change(&self, event: DocumentEvent);

    /// Handles an assembly save (the BOM-extraction trigger).
    async fn process_save(&self, event: DocumentEvent);
}

/// Processor that only logs events, used when no extractor is wired in.
#[derive(Debug, Default, Clone)]
pub struct LoggingProcessor;

#[async_trait]
impl DocumentProcessor for LoggingProcessor {
    async fn process_change(&self, event: DocumentEvent) {
        debug!(
            file = %event.file_name,
            project = %event.project_id,
            "Document change"
        );
    }

    async fn process_save(&self, event: DocumentEvent) {
        debug!(
            file = %event.file_name,
            project = %event.project_id,
            "Assembly save"
        );
    }
}
