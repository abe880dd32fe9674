//! Event types for CAD document monitoring.
//!
//! This module defines the typed payloads exchanged between the document
//! event source, the monitoring coordinator, and its collaborators. All
//! types serialize to camelCase JSON for the backend API.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a CAD document, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Assembly,
    Part,
    Drawing,
    Presentation,
    Unknown,
}

impl DocumentType {
    /// Determines the document type from a file path.
    ///
    /// Recognized extensions (case-insensitive): `.iam` (assembly),
    /// `.ipt` (part), `.idw` (drawing), `.ipn` (presentation).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use cadwatch_companion::types::DocumentType;
    ///
    /// assert_eq!(DocumentType::from_path(Path::new("motor.IAM")), DocumentType::Assembly);
    /// assert_eq!(DocumentType::from_path(Path::new("bracket.ipt")), DocumentType::Part);
    /// assert_eq!(DocumentType::from_path(Path::new("notes.txt")), DocumentType::Unknown);
    /// ```
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("iam") => Self::Assembly,
            Some("ipt") => Self::Part,
            Some("idw") => Self::Drawing,
            Some("ipn") => Self::Presentation,
            _ => Self::Unknown,
        }
    }
}

/// Kind of a normalized document event forwarded to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentEventType {
    Modified,
    Saved,
}

/// Document lifecycle notifications emitted by the host-application
/// event source.
///
/// Uses serde's internally tagged representation so the stdin adapter
/// can parse one JSON event per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A document was opened in the host application.
    Opened {
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(rename = "documentType")]
        document_type: DocumentType,
        timestamp: DateTime<Utc>,
        #[serde(rename = "fileSizeBytes", default)]
        file_size_bytes: u64,
    },
    /// A document was closed.
    Closed {
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(rename = "documentType")]
        document_type: DocumentType,
        timestamp: DateTime<Utc>,
    },
    /// A document was saved.
    Saved {
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(rename = "documentType")]
        document_type: DocumentType,
        timestamp: DateTime<Utc>,
        #[serde(rename = "isAutoSave", default)]
        is_auto_save: bool,
    },
}

impl HostEvent {
    /// Returns the file path this event refers to.
    #[must_use]
    pub fn file_path(&self) -> &str {
        match self {
            Self::Opened { file_path, .. }
            | Self::Closed { file_path, .. }
            | Self::Saved { file_path, .. } => file_path,
        }
    }
}

/// A document known to be open in the host application, as reported by
/// the startup snapshot listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDocument {
    pub file_path: String,
    pub file_name: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub file_size_bytes: u64,
}

/// Normalized notification forwarded to the document-processing
/// collaborator when a monitored file is modified or saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    pub file_path: String,
    pub file_name: String,
    pub event_type: DocumentEventType,
    pub document_type: DocumentType,
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub project_name: String,
    pub engineer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_from_known_extensions() {
        assert_eq!(
            DocumentType::from_path(Path::new("/proj/motor.iam")),
            DocumentType::Assembly
        );
        assert_eq!(
            DocumentType::from_path(Path::new("/proj/shaft.ipt")),
            DocumentType::Part
        );
        assert_eq!(
            DocumentType::from_path(Path::new("/proj/layout.idw")),
            DocumentType::Drawing
        );
        assert_eq!(
            DocumentType::from_path(Path::new("/proj/explode.ipn")),
            DocumentType::Presentation
        );
    }

    #[test]
    fn document_type_is_case_insensitive() {
        assert_eq!(
            DocumentType::from_path(Path::new("MOTOR.IAM")),
            DocumentType::Assembly
        );
        assert_eq!(
            DocumentType::from_path(Path::new("Shaft.Ipt")),
            DocumentType::Part
        );
    }

    #[test]
    fn document_type_unknown_for_other_extensions() {
        assert_eq!(
            DocumentType::from_path(Path::new("readme.md")),
            DocumentType::Unknown
        );
        assert_eq!(
            DocumentType::from_path(Path::new("no_extension")),
            DocumentType::Unknown
        );
    }

    #[test]
    fn host_event_parses_from_tagged_json() {
        let json = r#"{
            "type": "opened",
            "filePath": "/projects/C-100_Test/a.iam",
            "fileName": "a.iam",
            "documentType": "assembly",
            "timestamp": "2025-03-01T10:00:00Z"
        }"#;

        let event: HostEvent = serde_json::from_str(json).unwrap();
        match event {
            HostEvent::Opened {
                file_path,
                document_type,
                file_size_bytes,
                ..
            } => {
                assert_eq!(file_path, "/projects/C-100_Test/a.iam");
                assert_eq!(document_type, DocumentType::Assembly);
                assert_eq!(file_size_bytes, 0, "missing size defaults to 0");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn host_event_file_path_accessor() {
        let event = HostEvent::Saved {
            file_path: "/p/x.ipt".to_string(),
            file_name: "x.ipt".to_string(),
            document_type: DocumentType::Part,
            timestamp: Utc::now(),
            is_auto_save: false,
        };
        assert_eq!(event.file_path(), "/p/x.ipt");
    }

    #[test]
    fn document_event_serializes_with_camel_case_fields() {
        let event = DocumentEvent {
            file_path: "/p/x.iam".to_string(),
            file_name: "x.iam".to_string(),
            event_type: DocumentEventType::Saved,
            document_type: DocumentType::Assembly,
            timestamp: Utc::now(),
            project_id: "C-466".to_string(),
            project_name: "Bomba Hidraulica".to_string(),
            engineer: "alex".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("filePath").is_some());
        assert!(json.get("eventType").is_some());
        assert!(json.get("projectId").is_some());
        assert_eq!(json["eventType"], "saved");
        assert_eq!(json["documentType"], "assembly");
    }
}
