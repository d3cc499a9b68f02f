//! Retry session state and the immutable delay sequence

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::utils::constants::DEFAULT_RETRY_INTERVALS_MS;
use crate::utils::{WatchError, validate_retry_intervals};

/// Fixed, ordered retry delays shared by every wake-up of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Arc<[Duration]>,
}

impl BackoffSchedule {
    pub fn from_millis(intervals_ms: &[u64]) -> Result<Self, WatchError> {
        let delays = validate_retry_intervals(intervals_ms)?;
        Ok(Self {
            delays: delays.into(),
        })
    }

    /// Delay for a backoff index. Indices wrap, so any index is valid.
    pub fn delay(&self, index: usize) -> Duration {
        self.delays[index % self.delays.len()]
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Index after one error-driven retry
    pub fn advance(&self, index: usize) -> usize {
        (index + 1) % self.delays.len()
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: DEFAULT_RETRY_INTERVALS_MS
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    Idle,
    Retrying,
}

/// The one outstanding scheduled wake-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWake {
    pub deadline: Instant,
    pub delay: Duration,
    pub backoff_index: usize,
}

/// Mutable retry state for one watched page
///
/// Invariants:
/// - `pending` is set only while `state` is `Retrying`
/// - `backoff_index < schedule.len()`
#[derive(Debug, Clone)]
pub struct RetrySession {
    pub(crate) id: Uuid,
    pub(crate) state: RetryState,
    pub(crate) backoff_index: usize,
    pub(crate) click_count: u32,
    pub(crate) max_clicks: Option<u32>,
    pub(crate) pending: Option<PendingWake>,
    pub(crate) last_click_at: Option<DateTime<Utc>>,
}

impl RetrySession {
    pub fn new(max_clicks: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RetryState::Idle,
            backoff_index: 0,
            click_count: 0,
            max_clicks,
            pending: None,
            last_click_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn is_retrying(&self) -> bool {
        self.state == RetryState::Retrying
    }

    pub fn backoff_index(&self) -> usize {
        self.backoff_index
    }

    pub fn click_count(&self) -> u32 {
        self.click_count
    }

    pub fn max_clicks(&self) -> Option<u32> {
        self.max_clicks
    }

    pub fn pending(&self) -> Option<&PendingWake> {
        self.pending.as_ref()
    }

    /// Whether the capped variant has used up its clicks
    pub fn cap_reached(&self) -> bool {
        self.max_clicks
            .is_some_and(|max| self.click_count >= max)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            backoff_index: self.backoff_index,
            click_count: self.click_count,
            max_clicks: self.max_clicks,
            next_wake_in_ms: self.pending.map(|p| {
                p.deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64
            }),
            last_click_at: self.last_click_at,
        }
    }
}

/// Serializable view of a session for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: RetryState,
    pub backoff_index: usize,
    pub click_count: u32,
    pub max_clicks: Option<u32>,
    pub next_wake_in_ms: Option<u64>,
    pub last_click_at: Option<DateTime<Utc>>,
}
