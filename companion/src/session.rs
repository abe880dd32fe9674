//! Work session state and daily aggregate statistics.
//!
//! A [`WorkSession`] records one continuous interval of activity on a
//! single open document, bounded by the open and close events for that
//! document. Sessions move from `Active` (no end time) to `Ended`
//! exactly once and are immutable afterwards.
//!
//! The [`WorkSessionTracker`] owns all session state behind an `RwLock`
//! and is cheap to clone; clones share the same store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Session duration below which a session is classified as too short.
const MIN_SESSION_MINUTES: i64 = 5;

/// Session duration above which a session is classified as very long.
const MAX_SESSION_MINUTES: i64 = 240;

/// Saves-per-hour below this bound classify as low activity.
const LOW_ACTIVITY_SAVES_PER_HOUR: f64 = 1.0;

/// Saves-per-hour above this bound classify as high activity.
const HIGH_ACTIVITY_SAVES_PER_HOUR: f64 = 20.0;

/// Days an ended session is kept for daily statistics and idempotent
/// re-end lookups before being pruned.
const ENDED_SESSION_RETENTION_DAYS: u64 = 7;

/// Reason for a session activity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityReason {
    /// The document was saved in the host application.
    Save,
    /// The file changed on disk without an explicit save event.
    Change,
}

impl ActivityReason {
    /// Wire representation used in telemetry payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Save => "SAVE",
            Self::Change => "CHANGE",
        }
    }
}

/// Quality band for an ended session, derived from duration and saves.
///
/// This is a pure function of the session record, computed at reporting
/// time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionQuality {
    TooShort,
    NoSaves,
    VeryLong,
    LowActivity,
    Normal,
    HighActivity,
}

/// Classifies a session by its duration and save count.
///
/// Bands: under 5 minutes is too short; zero saves is unproductive;
/// over 4 hours is suspiciously long; otherwise saves-per-hour decides
/// between low, normal, and high activity.
#[must_use]
pub fn classify_quality(duration: Duration, save_count: u32) -> SessionQuality {
    let minutes = duration.num_seconds() as f64 / 60.0;

    if minutes < MIN_SESSION_MINUTES as f64 {
        return SessionQuality::TooShort;
    }
    if save_count == 0 {
        return SessionQuality::NoSaves;
    }
    if minutes > MAX_SESSION_MINUTES as f64 {
        return SessionQuality::VeryLong;
    }

    let saves_per_hour = f64::from(save_count) / (minutes / 60.0);
    if saves_per_hour < LOW_ACTIVITY_SAVES_PER_HOUR {
        SessionQuality::LowActivity
    } else if saves_per_hour > HIGH_ACTIVITY_SAVES_PER_HOUR {
        SessionQuality::HighActivity
    } else {
        SessionQuality::Normal
    }
}

/// The record of one continuous work interval on one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: Uuid,
    pub file_path: String,
    pub file_name: String,
    pub project_id: String,
    pub project_name: String,
    pub engineer: String,
    pub start_time: DateTime<Utc>,
    /// Set exactly once when the session ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub save_count: u32,
    /// Derived from `end_time - start_time` when the session ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
}

impl WorkSession {
    /// Whether the session is still active (no end time recorded).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Duration of an ended session.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::seconds)
    }
}

/// Identity and timing data needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionSeed {
    pub file_path: String,
    pub file_name: String,
    pub project_id: String,
    pub project_name: String,
    pub engineer: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionStore {
    active: HashMap<Uuid, WorkSession>,
    ended: Vec<WorkSession>,
}

/// Owns work-session lifecycle transitions and daily aggregates.
#[derive(Debug, Clone, Default)]
pub struct WorkSessionTracker {
    store: Arc<RwLock<SessionStore>>,
}

impl WorkSessionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new session in the active state and returns it.
    pub async fn start(&self, seed: SessionSeed) -> WorkSession {
        let session = WorkSession {
            id: Uuid::new_v4(),
            file_path: seed.file_path,
            file_name: seed.file_name,
            project_id: seed.project_id,
            project_name: seed.project_name,
            engineer: seed.engineer,
            start_time: seed.start_time,
            end_time: None,
            last_activity: seed.start_time,
            save_count: 0,
            duration_secs: None,
        };

        let mut store = self.store.write().await;
        store.active.insert(session.id, session.clone());

        info!(
            session_id = %session.id,
            file = %session.file_name,
            project = %session.project_id,
            "Work session started"
        );

        session
    }

    /// Records activity on an active session.
    ///
    /// A [`ActivityReason::Save`] bumps the save counter; any reason
    /// sets `last_activity` to `timestamp`, the host event's clock, so
    /// session and watcher activity stamps agree. Unknown session ids
    /// (already ended or never started) are silently ignored.
    pub async fn record_activity(
        &self,
        session_id: Uuid,
        reason: ActivityReason,
        timestamp: DateTime<Utc>,
    ) {
        let mut store = self.store.write().await;
        let Some(session) = store.active.get_mut(&session_id) else {
            debug!(session_id = %session_id, "Activity for unknown session ignored");
            return;
        };

        session.last_activity = timestamp;
        if reason == ActivityReason::Save {
            session.save_count += 1;
        }
    }

    /// Ends a session, computing its duration.
    ///
    /// Idempotent: ending an already-ended session returns the stored
    /// record unchanged, with the originally computed duration. Returns
    /// `None` for ids that were never started. Ended records are kept
    /// for a bounded retention window; outside it they are pruned and
    /// idempotent re-end lookups no longer find them.
    pub async fn end(&self, session_id: Uuid, end_time: DateTime<Utc>) -> Option<WorkSession> {
        let mut store = self.store.write().await;

        if let Some(mut session) = store.active.remove(&session_id) {
            session.end_time = Some(end_time);
            session.duration_secs = Some((end_time - session.start_time).num_seconds());
            store.ended.push(session.clone());

            if let Some(cutoff) = end_time
                .date_naive()
                .checked_sub_days(Days::new(ENDED_SESSION_RETENTION_DAYS))
            {
                store.ended.retain(|s| s.start_time.date_naive() >= cutoff);
            }

            info!(
                session_id = %session_id,
                duration_secs = session.duration_secs.unwrap_or(0),
                saves = session.save_count,
                "Work session ended"
            );

            return Some(session);
        }

        store
            .ended
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Looks up a session by id across active and ended sets.
    pub async fn session(&self, session_id: Uuid) -> Option<WorkSession> {
        let store = self.store.read().await;
        store
            .active
            .get(&session_id)
            .cloned()
            .or_else(|| store.ended.iter().find(|s| s.id == session_id).cloned())
    }

    /// Snapshot of all currently active sessions.
    pub async fn active_sessions(&self) -> Vec<WorkSession> {
        self.store.read().await.active.values().cloned().collect()
    }

    /// Number of currently active sessions.
    pub async fn active_count(&self) -> usize {
        self.store.read().await.active.len()
    }

    /// Aggregates statistics over sessions whose start falls on `date`.
    ///
    /// Active sessions contribute their elapsed time so far; ended
    /// sessions contribute their final duration.
    pub async fn daily_statistics(&self, date: NaiveDate) -> DailyStatistics {
        let store = self.store.read().await;
        let now = Utc::now();

        let mut stats = DailyStatistics::empty(date);
        let mut engineers = HashSet::new();
        let mut projects = HashSet::new();

        let sessions = store
            .active
            .values()
            .chain(store.ended.iter())
            .filter(|s| s.start_time.date_naive() == date);

        for session in sessions {
            stats.total_sessions += 1;
            stats.total_saves += u64::from(session.save_count);
            stats.total_work_seconds += session
                .duration_secs
                .unwrap_or_else(|| (now - session.start_time).num_seconds())
                .max(0);
            engineers.insert(session.engineer.clone());
            projects.insert(session.project_id.clone());
        }

        stats.active_engineers = engineers.len();
        stats.active_projects = projects.len();
        stats
    }
}

/// Aggregate statistics for one calendar day, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatistics {
    pub date: NaiveDate,
    pub total_sessions: usize,
    pub total_work_seconds: i64,
    pub total_saves: u64,
    pub active_engineers: usize,
    pub active_projects: usize,
}

impl DailyStatistics {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_sessions: 0,
            total_work_seconds: 0,
            total_saves: 0,
            active_engineers: 0,
            active_projects: 0,
        }
    }
}
