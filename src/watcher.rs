//! The watcher's event loop
//!
//! Mutation batches, the pending wake-up, operator commands and shutdown all
//! feed one `select!` loop that owns the controller. Nothing else touches the
//! session, so the monitor and the wake-up handler never interleave.

use std::str::FromStr;

use futures::{FutureExt, Stream, StreamExt};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::{RetryController, SessionSnapshot, WakeOutcome};
use crate::inspector::PageSurface;
use crate::monitor::{ChangeMonitor, MutationBatch};

/// Commands an operator can send while the watcher runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    /// Change the click cap (`max <n>`)
    SetMaxClicks(u32),
    /// Log the session snapshot (`status`)
    Status,
    /// Enter the retry cycle now (`start`)
    Start,
    /// Leave the retry cycle now (`stop`)
    Stop,
}

impl FromStr for WatchCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_ascii_lowercase();
        let arg = parts.next();

        match (command.as_str(), arg) {
            ("max", Some(n)) => n
                .parse()
                .map(WatchCommand::SetMaxClicks)
                .map_err(|_| format!("'{n}' is not a click count")),
            ("max", None) => Err("usage: max <clicks>".to_string()),
            ("status", _) => Ok(WatchCommand::Status),
            ("start", _) => Ok(WatchCommand::Start),
            ("stop", _) => Ok(WatchCommand::Stop),
            ("", _) => Err("empty command".to_string()),
            (other, _) => Err(format!(
                "unknown command '{other}' (expected: max <n>, status, start, stop)"
            )),
        }
    }
}

pub struct Watcher<S: PageSurface> {
    controller: RetryController<S>,
    monitor: ChangeMonitor,
}

impl<S: PageSurface> Watcher<S> {
    pub fn new(controller: RetryController<S>) -> Self {
        Self {
            controller,
            monitor: ChangeMonitor::new(),
        }
    }

    pub fn controller(&self) -> &RetryController<S> {
        &self.controller
    }

    /// Run until `shutdown` fires or the mutation feed ends
    ///
    /// Returns the session as it stood when the loop exited.
    pub async fn run<M, C>(
        mut self,
        mut mutations: M,
        mut commands: C,
        shutdown: CancellationToken,
    ) -> SessionSnapshot
    where
        M: Stream<Item = MutationBatch> + Unpin,
        C: Stream<Item = WatchCommand> + Unpin,
    {
        info!(
            session = %self.controller.session().id(),
            delays = self.controller.schedule().len(),
            max_clicks = ?self.controller.session().max_clicks(),
            "Watcher started"
        );
        self.monitor.initial_check(&mut self.controller).await;

        let mut commands_open = true;
        loop {
            let deadline = self.controller.pending_deadline();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let outcome = self.controller.on_wake().await;
                    if outcome == WakeOutcome::ClickSkipped {
                        warn!("Regenerate button not found, will try again on the next check");
                    }
                }

                batch = mutations.next() => {
                    let Some(batch) = batch else {
                        info!("Mutation feed closed, page is gone");
                        break;
                    };
                    let (batch, feed_closed) = coalesce(&mut mutations, batch);
                    self.monitor.on_mutations(&mut self.controller, batch).await;
                    if feed_closed {
                        info!("Mutation feed closed, page is gone");
                        break;
                    }
                }

                command = commands.next(), if commands_open => match command {
                    Some(command) => self.apply(command),
                    None => commands_open = false,
                },
            }
        }

        info!(
            batches = self.monitor.batches(),
            records = self.monitor.records(),
            clicks = self.controller.session().click_count(),
            "Watcher finished"
        );
        self.controller.session().snapshot()
    }

    fn apply(&mut self, command: WatchCommand) {
        match command {
            WatchCommand::SetMaxClicks(n) => {
                self.controller.set_max_clicks(n);
            }
            WatchCommand::Status => match serde_json::to_string(&self.controller.session().snapshot()) {
                Ok(json) => info!("Status: {}", json),
                Err(e) => warn!("Failed to serialize status: {}", e),
            },
            WatchCommand::Start => {
                if !self.controller.start() {
                    info!(
                        retrying = self.controller.is_retrying(),
                        clicks = self.controller.session().click_count(),
                        "Start ignored"
                    );
                }
            }
            WatchCommand::Stop => self.controller.stop(),
        }
    }
}

/// Fold batches that are already queued into `first`
///
/// Streaming output produces bursts of mutations; one evaluation covers the
/// whole burst. Also reports whether the feed ended while draining.
fn coalesce<M>(mutations: &mut M, first: MutationBatch) -> (MutationBatch, bool)
where
    M: Stream<Item = MutationBatch> + Unpin,
{
    let mut records = first.records;
    let mut merged = 1usize;
    loop {
        match mutations.next().now_or_never() {
            Some(Some(more)) => {
                records += more.records;
                merged += 1;
            }
            Some(None) => return (MutationBatch::new(records), true),
            None => break,
        }
    }
    if merged > 1 {
        debug!(merged, records, "Coalesced mutation batches");
    }
    (MutationBatch::new(records), false)
}
