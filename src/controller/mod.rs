//! Retry Controller
//!
//! Owns the session and moves it between `Idle` and `Retrying`. The controller
//! never sleeps: it records the single pending wake-up as a deadline and the
//! watcher's event loop calls [`RetryController::on_wake`] when that deadline
//! passes. Clearing the deadline in [`RetryController::stop`] is therefore all
//! the cancellation a stale wake-up needs.

mod session;

pub use session::{BackoffSchedule, PendingWake, RetrySession, RetryState, SessionSnapshot};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::inspector::{PageInspector, PageState, PageSurface};

/// What a wake-up does when the page shows no recognized state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Re-arm at the same backoff index and look again later
    #[default]
    Reschedule,
    /// End the cycle; the change monitor restarts it if an error shows up
    Halt,
}

/// Result of one fired wake-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// No wake-up was armed
    NotArmed,
    /// Error still showing, regenerate clicked
    Clicked,
    /// Error still showing but the control was not found
    ClickSkipped,
    /// Error still showing and the click cap is used up; cycle stopped
    CapReached,
    /// Generation in progress; re-armed without advancing
    StillGenerating,
    /// Normal output; cycle stopped
    Finished,
    /// Nothing recognizable on the page
    Unrecognized,
}

pub struct RetryController<S: PageSurface> {
    inspector: PageInspector<S>,
    schedule: BackoffSchedule,
    session: RetrySession,
    idle_policy: IdlePolicy,
}

impl<S: PageSurface> RetryController<S> {
    pub fn new(
        inspector: PageInspector<S>,
        schedule: BackoffSchedule,
        max_clicks: Option<u32>,
        idle_policy: IdlePolicy,
    ) -> Self {
        Self {
            inspector,
            schedule,
            session: RetrySession::new(max_clicks),
            idle_policy,
        }
    }

    pub fn session(&self) -> &RetrySession {
        &self.session
    }

    pub fn inspector(&self) -> &PageInspector<S> {
        &self.inspector
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    pub fn is_retrying(&self) -> bool {
        self.session.is_retrying()
    }

    /// When the pending wake-up is due, if one is armed
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.session.pending.map(|p| p.deadline)
    }

    /// Enter the retry cycle and arm the first wake-up
    ///
    /// Returns `false` without touching the session when a cycle is already
    /// running or the click cap is used up. The backoff index and click count
    /// carry over from earlier cycles.
    pub fn start(&mut self) -> bool {
        if self.session.is_retrying() {
            debug!(session = %self.session.id, "Already retrying, skipping start");
            return false;
        }

        if self.session.cap_reached() {
            debug!(
                session = %self.session.id,
                clicks = self.session.click_count,
                "Maximum regenerate clicks reached, not starting retry cycle"
            );
            return false;
        }

        info!(session = %self.session.id, "Starting retry cycle");
        self.session.state = RetryState::Retrying;
        self.schedule_next();
        true
    }

    /// Leave the retry cycle
    ///
    /// Cancels the pending wake-up and resets the backoff index. The click
    /// count is kept for the whole session. Calling this while idle does nothing.
    pub fn stop(&mut self) {
        if !self.session.is_retrying() {
            debug!(session = %self.session.id, "Stop requested while idle");
            return;
        }

        info!(
            session = %self.session.id,
            clicks = self.session.click_count,
            "Stopping retry cycle"
        );
        self.session.state = RetryState::Idle;
        if let Some(cancelled) = self.session.pending.take() {
            debug!("Cancelled wake-up due in {:?}", cancelled.deadline.saturating_duration_since(Instant::now()));
        }
        self.session.backoff_index = 0;
    }

    /// Change the click cap at runtime
    ///
    /// Zero is rejected and the previous cap kept.
    pub fn set_max_clicks(&mut self, max_clicks: u32) -> bool {
        if max_clicks == 0 {
            warn!("Ignoring max clicks of 0; keeping {:?}", self.session.max_clicks);
            return false;
        }
        info!("Maximum regenerate clicks updated to {}", max_clicks);
        self.session.max_clicks = Some(max_clicks);
        true
    }

    fn schedule_next(&mut self) {
        if !self.session.is_retrying() {
            warn!(session = %self.session.id, "Retry cycle stopped, not scheduling next wake-up");
            return;
        }

        let delay = self.schedule.delay(self.session.backoff_index);
        debug!(
            session = %self.session.id,
            backoff_index = self.session.backoff_index,
            "Scheduling next check in {}ms",
            delay.as_millis()
        );
        self.session.pending = Some(PendingWake {
            deadline: Instant::now() + delay,
            delay,
            backoff_index: self.session.backoff_index,
        });
    }

    /// Handle the pending wake-up firing
    pub async fn on_wake(&mut self) -> WakeOutcome {
        if self.session.pending.take().is_none() {
            warn!(session = %self.session.id, "Wake-up fired with nothing armed");
            return WakeOutcome::NotArmed;
        }

        match self.inspector.classify().await {
            PageState::ErrorBanner => {
                if self.session.cap_reached() {
                    info!(
                        session = %self.session.id,
                        "Maximum regenerate clicks reached, stopping retry cycle"
                    );
                    self.stop();
                    return WakeOutcome::CapReached;
                }

                info!(session = %self.session.id, "Server still busy, retrying");
                let clicked = self.click_regenerate().await;
                self.session.backoff_index = self.schedule.advance(self.session.backoff_index);
                self.schedule_next();

                if clicked {
                    WakeOutcome::Clicked
                } else {
                    WakeOutcome::ClickSkipped
                }
            }
            PageState::Generating => {
                debug!(session = %self.session.id, "Content is generating, waiting");
                self.schedule_next();
                WakeOutcome::StillGenerating
            }
            PageState::NormalOutput => {
                info!(session = %self.session.id, "Normal output detected");
                self.stop();
                WakeOutcome::Finished
            }
            PageState::Unrecognized => {
                match self.idle_policy {
                    IdlePolicy::Reschedule => {
                        debug!(session = %self.session.id, "Page state unrecognized, checking again later");
                        self.schedule_next();
                    }
                    IdlePolicy::Halt => {
                        info!(session = %self.session.id, "Page state unrecognized, ending retry cycle");
                        self.stop();
                    }
                }
                WakeOutcome::Unrecognized
            }
        }
    }

    /// Click the regenerate control if it can be found
    ///
    /// A missing control is not an error: the attempt is skipped and the next
    /// wake-up tries again.
    pub async fn click_regenerate(&mut self) -> bool {
        let Some(button) = self.inspector.find_regenerate_button().await else {
            return false;
        };

        let strategy = button.strategy;
        if !self.inspector.activate(button).await {
            return false;
        }

        self.session.click_count += 1;
        self.session.last_click_at = Some(Utc::now());
        info!(
            session = %self.session.id,
            clicks = self.session.click_count,
            max = ?self.session.max_clicks,
            "Clicked regenerate button (found via {})",
            strategy
        );
        true
    }
}
