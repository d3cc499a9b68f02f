//! Page Inspector
//!
//! Stateless read-only questions about the watched page. Every answer comes
//! from a fresh query against the surface. A query that fails is logged and
//! read as "not present", so the callers only ever see booleans and options.

mod cdp;
mod strategy;
mod surface;

pub use cdp::CdpSurface;
pub use strategy::{ButtonStrategy, default_regenerate_strategies};
pub use surface::PageSurface;

use tracing::{debug, info, warn};

use crate::PageProfile;

/// What a scheduled wake-up sees, in the order the checks are made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    ErrorBanner,
    Generating,
    NormalOutput,
    Unrecognized,
}

/// A located regenerate control and the strategy that found it
#[derive(Debug)]
pub struct RegenerateButton<H> {
    pub handle: H,
    pub strategy: &'static str,
}

pub struct PageInspector<S: PageSurface> {
    surface: S,
    profile: PageProfile,
}

impl<S: PageSurface> PageInspector<S> {
    pub fn new(surface: S, profile: PageProfile) -> Self {
        Self { surface, profile }
    }

    /// True iff some text-bearing element contains one of the error phrases
    pub async fn has_error_banner(&self) -> bool {
        match self
            .surface
            .find_text(&self.profile.error_text_selector, &self.profile.error_phrases)
            .await
        {
            Ok(Some(text)) => {
                debug!("Found error message: {}", text.trim());
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Error banner query failed, treating as absent: {}", e);
                false
            }
        }
    }

    /// True iff a loading or spinner marker is on the page
    pub async fn is_generating(&self) -> bool {
        match self.surface.count(&self.profile.loading_selector).await {
            Ok(n) if n > 0 => {
                debug!("Content is generating ({} loading markers)", n);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Loading marker query failed, treating as absent: {}", e);
                false
            }
        }
    }

    /// True iff a message exists, no error banner shows and nothing is generating
    ///
    /// Derived signal: it re-asks the other two questions.
    pub async fn has_normal_output(&self) -> bool {
        let messages = match self.surface.count(&self.profile.message_selector).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Message query failed, treating as absent: {}", e);
                0
            }
        };

        let normal = messages > 0 && !self.has_error_banner().await && !self.is_generating().await;
        if normal {
            debug!("Normal output detected");
        }
        normal
    }

    /// Try each configured strategy in order and return the first match
    pub async fn find_regenerate_button(&self) -> Option<RegenerateButton<S::Handle>> {
        debug!(
            "Searching for regenerate button using {} strategies",
            self.profile.regenerate.len()
        );

        for strategy in &self.profile.regenerate {
            match self.surface.locate(strategy).await {
                Ok(Some(handle)) => {
                    debug!("Found regenerate button via {}", strategy.label());
                    return Some(RegenerateButton {
                        handle,
                        strategy: strategy.label(),
                    });
                }
                Ok(None) => debug!("Strategy {} found nothing", strategy.label()),
                Err(e) => warn!("Strategy {} failed: {}", strategy.label(), e),
            }
        }

        info!("Regenerate button not found");
        None
    }

    /// Click a located control. Returns whether the click was dispatched.
    pub async fn activate(&self, button: RegenerateButton<S::Handle>) -> bool {
        match self.surface.activate(button.handle).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Clicking regenerate button ({}) failed: {}", button.strategy, e);
                false
            }
        }
    }

    /// Decide what the page currently shows, checking error, then generating,
    /// then normal output
    pub async fn classify(&self) -> PageState {
        if self.has_error_banner().await {
            PageState::ErrorBanner
        } else if self.is_generating().await {
            PageState::Generating
        } else if self.has_normal_output().await {
            PageState::NormalOutput
        } else {
            PageState::Unrecognized
        }
    }
}
