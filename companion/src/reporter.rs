//! Telemetry reporting to the backend API.
//!
//! The coordinator reports session lifecycle transitions and periodic
//! heartbeats through the [`TelemetryReporter`] trait. The production
//! implementation, [`HttpReporter`], posts camelCase JSON to the
//! backend with:
//!
//! - Connection pooling via reqwest
//! - A 30 second request timeout
//! - Failure isolation: transport errors and non-2xx responses are
//!   logged and swallowed, never propagated to the caller
//!
//! Telemetry is best-effort by design. A dead backend must not stall
//! the monitoring loop or lose local session state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::session::{classify_quality, DailyStatistics, SessionQuality, WorkSession};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Derived summary attached to a session-ended report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub duration_minutes: f64,
    pub save_count: u32,
    /// A session with at least one save counts as productive.
    pub is_productive: bool,
    pub quality: SessionQuality,
}

impl SessionSummary {
    /// Computes the summary for an ended session.
    ///
    /// Sessions still active (no recorded duration) summarize as zero
    /// minutes, which classifies as too short.
    #[must_use]
    pub fn for_session(session: &WorkSession) -> Self {
        let duration = session
            .duration()
            .unwrap_or_else(chrono::Duration::zero);

        Self {
            duration_minutes: duration.num_seconds() as f64 / 60.0,
            save_count: session.save_count,
            is_productive: session.save_count > 0,
            quality: classify_quality(duration, session.save_count),
        }
    }
}

/// Periodic liveness report with a snapshot of today's activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub companion_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub active_sessions: usize,
    pub active_watchers: usize,
    pub today: DailyStatistics,
}

/// Receives session lifecycle and liveness telemetry.
///
/// All methods are infallible from the caller's point of view;
/// implementations own delivery failures.
#[async_trait]
pub trait TelemetryReporter: Send + Sync {
    /// Reports a newly started session.
    async fn session_started(&self, session: &WorkSession);

    /// Reports an ended session together with its derived summary.
    async fn session_ended(&self, session: &WorkSession, summary: &SessionSummary);

    /// Reports activity on a running session. `reason` is the wire
    /// string from [`crate::session::ActivityReason::as_str`].
    async fn session_updated(&self, session: &WorkSession, reason: &str);

    /// Reports companion liveness.
    async fn heartbeat(&self, heartbeat: &Heartbeat);
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionEnvelope<'a> {
    session: &'a WorkSession,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a SessionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_reason: Option<&'a str>,
}

/// Reporter that posts JSON telemetry to the backend API.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: Client,
    base_url: String,
}

impl HttpReporter {
    /// Creates a reporter for the given base URL (no trailing slash
    /// required).
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Http`](crate::error::MonitorError) when
    /// the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Checks backend reachability via `GET /api/health`.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Backend health check failed");
                false
            }
            Err(err) => {
                warn!(error = %err, "Backend unreachable");
                false
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T, what: &str) {
        let url = format!("{}{}", self.base_url, path);

        match self.client.post(&url).json(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "Reported {what}");
            }
            Ok(response) => {
                warn!(
                    url = %url,
                    status = %response.status(),
                    "Backend rejected {what}"
                );
            }
            Err(err) => {
                warn!(url = %url, error = %err, "Failed to report {what}");
            }
        }
    }
}

#[async_trait]
impl TelemetryReporter for HttpReporter {
    async fn session_started(&self, session: &WorkSession) {
        let envelope = SessionEnvelope {
            session,
            timestamp: Utc::now(),
            summary: None,
            update_reason: None,
        };
        self.post("/api/work-sessions/started", &envelope, "session start")
            .await;
    }

    async fn session_ended(&self, session: &WorkSession, summary: &SessionSummary) {
        let envelope = SessionEnvelope {
            session,
            timestamp: Utc::now(),
            summary: Some(summary),
            update_reason: None,
        };
        self.post("/api/work-sessions/ended", &envelope, "session end")
            .await;
    }

    async fn session_updated(&self, session: &WorkSession, reason: &str) {
        let envelope = SessionEnvelope {
            session,
            timestamp: Utc::now(),
            summary: None,
            update_reason: Some(reason),
        };
        self.post("/api/work-sessions/updated", &envelope, "session update")
            .await;
    }

    async fn heartbeat(&self, heartbeat: &Heartbeat) {
        self.post("/api/companion/heartbeat", heartbeat, "heartbeat")
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn ended_session(duration_mins: i64, saves: u32) -> WorkSession {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        WorkSession {
            id: Uuid::new_v4(),
            file_path: "/p/a.iam".to_string(),
            file_name: "a.iam".to_string(),
            project_id: "C-100".to_string(),
            project_name: "Test".to_string(),
            engineer: "alex".to_string(),
            start_time: start,
            end_time: Some(start + chrono::Duration::minutes(duration_mins)),
            last_activity: start,
            save_count: saves,
            duration_secs: Some(duration_mins * 60),
        }
    }

    #[test]
    fn summary_marks_saved_session_productive() {
        let summary = SessionSummary::for_session(&ended_session(30, 4));
        assert!(summary.is_productive);
        assert_eq!(summary.save_count, 4);
        assert_eq!(summary.duration_minutes, 30.0);
        assert_eq!(summary.quality, SessionQuality::Normal);
    }

    #[test]
    fn summary_marks_saveless_session_unproductive() {
        let summary = SessionSummary::for_session(&ended_session(30, 0));
        assert!(!summary.is_productive);
        assert_eq!(summary.quality, SessionQuality::NoSaves);
    }

    #[test]
    fn summary_of_active_session_is_too_short() {
        let mut session = ended_session(30, 2);
        session.end_time = None;
        session.duration_secs = None;

        let summary = SessionSummary::for_session(&session);
        assert_eq!(summary.duration_minutes, 0.0);
        assert_eq!(summary.quality, SessionQuality::TooShort);
    }

    #[test]
    fn envelope_serializes_camel_case_and_omits_empty_fields() {
        let session = ended_session(10, 1);
        let envelope = SessionEnvelope {
            session: &session,
            timestamp: Utc::now(),
            summary: None,
            update_reason: Some("SAVE"),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["updateReason"], "SAVE");
        assert!(json.get("summary").is_none());
        assert!(json["session"].get("fileName").is_some());
    }
}
