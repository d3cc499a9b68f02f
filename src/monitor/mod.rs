//! Change Monitor
//!
//! Reacts to batches of page mutations. It is the only thing that enters the
//! retry cycle from an idle page, apart from the one check made at startup.

mod observer;

pub use observer::{MutationFeed, install_mutation_feed, observer_script};

use tracing::{debug, info};

use crate::controller::RetryController;
use crate::inspector::PageSurface;

/// One observer callback's worth of DOM changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationBatch {
    pub records: usize,
}

impl MutationBatch {
    pub fn new(records: usize) -> Self {
        Self { records }
    }

    /// Parse the record count the page-side observer sends
    pub fn from_payload(payload: &str) -> Self {
        Self {
            records: payload.trim().parse().unwrap_or(1),
        }
    }
}

/// What a monitor pass did to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    Started,
    /// An error is showing but `start` declined (cap reached)
    StartDeclined,
    Stopped,
    Nothing,
}

#[derive(Debug, Default)]
pub struct ChangeMonitor {
    batches: u64,
    records: u64,
}

impl ChangeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches handled so far
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Mutation records seen so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// React to a batch of mutations
    ///
    /// - error showing and idle: start the cycle
    /// - retrying and normal output showing: stop it
    pub async fn on_mutations<S: PageSurface>(
        &mut self,
        controller: &mut RetryController<S>,
        batch: MutationBatch,
    ) -> MonitorAction {
        self.batches += 1;
        self.records += batch.records as u64;

        let error = controller.inspector().has_error_banner().await;
        if error && !controller.is_retrying() {
            return if controller.start() {
                info!("Server busy message detected, retry cycle started");
                MonitorAction::Started
            } else {
                debug!("Server busy message still showing, retry cycle not restarted");
                MonitorAction::StartDeclined
            };
        }

        if controller.is_retrying() && controller.inspector().has_normal_output().await {
            info!("Normal output detected, stopping retry cycle");
            controller.stop();
            return MonitorAction::Stopped;
        }

        debug!(records = batch.records, "Mutation batch needed no action");
        MonitorAction::Nothing
    }

    /// One-time check made right after the observer is attached
    pub async fn initial_check<S: PageSurface>(
        &mut self,
        controller: &mut RetryController<S>,
    ) -> MonitorAction {
        if controller.inspector().has_error_banner().await {
            info!("Initial check: server busy message detected");
            if controller.start() {
                MonitorAction::Started
            } else {
                MonitorAction::StartDeclined
            }
        } else {
            MonitorAction::Nothing
        }
    }
}
