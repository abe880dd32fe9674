//! Leading-edge debounce for file-change notifications.
//!
//! File systems emit bursts of change events for a single logical write.
//! The [`DebounceGate`] keeps a last-emitted timestamp per key and lets
//! the first event of a burst through while discarding followers inside
//! the window. This favors low latency for the first save signal over
//! completeness of every intermediate write; trailing writes inside an
//! active window are intentionally dropped.
//!
//! Timestamps come from [`tokio::time::Instant`] so tests can drive the
//! clock with `tokio::time::pause`/`advance`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::trace;

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// A keyed leading-edge debounce gate.
///
/// Cloning is cheap; clones share the same timestamp table, so all
/// watchers for a coordinator consult one gate.
#[derive(Debug, Clone)]
pub struct DebounceGate<K>
where
    K: Clone + Eq + Hash,
{
    window: Duration,
    last_emitted: Arc<RwLock<HashMap<K, Instant>>>,
}

impl<K> DebounceGate<K>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
{
    /// Creates a gate with the given debounce window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a gate with the default 2000 ms window.
    #[must_use]
    pub fn with_default_window() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    /// Returns the configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decides whether an event for `key` passes the gate.
    ///
    /// Returns `false` (discard) when the previous emission for this key
    /// is younger than the window; otherwise records now as the emission
    /// time and returns `true`.
    pub async fn accept(&self, key: &K) -> bool {
        let now = Instant::now();

        {
            let table = self.last_emitted.read().await;
            if let Some(last) = table.get(key) {
                if now.duration_since(*last) < self.window {
                    trace!(key = ?key, "Event discarded by debounce gate");
                    return false;
                }
            }
        }

        let mut table = self.last_emitted.write().await;
        // Re-check under the write lock: a racing accept for the same
        // key may have recorded an emission between the two locks.
        if let Some(last) = table.get(key) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        table.insert(key.clone(), now);
        true
    }

    /// Drops the recorded state for a key, typically on document close.
    pub async fn forget(&self, key: &K) {
        self.last_emitted.write().await.remove(key);
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.last_emitted.read().await.len()
    }
}
