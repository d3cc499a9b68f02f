//! Ownership of a browser and its CDP handler task

use chromiumoxide::browser::Browser;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser_setup::ProfileDir;

/// How the watcher came to hold this browser
#[derive(Debug, Clone)]
pub enum BrowserOrigin {
    /// We launched it and own its process and profile
    Launched(ProfileDir),
    /// Someone else's browser reached over its debugging port
    Attached,
}

/// Browser plus the task driving its CDP connection
///
/// The handler is aborted on drop. Closing the Chrome process is left to
/// `BrowserManager::shutdown`, and only for launched browsers.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    origin: BrowserOrigin,
    cleaned_up: bool,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, origin: BrowserOrigin) -> Self {
        Self {
            browser,
            handler,
            origin,
            cleaned_up: false,
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.origin, BrowserOrigin::Attached)
    }

    /// Remove an ephemeral profile directory
    ///
    /// MUST be called after `browser.wait()` so Chrome has released its files.
    pub fn cleanup_profile(&mut self) {
        if let BrowserOrigin::Launched(profile) = &self.origin {
            profile.cleanup();
        }
        self.cleaned_up = true;
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        info!("Dropping BrowserWrapper - aborting handler task");
        self.handler.abort();

        if let BrowserOrigin::Launched(profile) = &self.origin
            && profile.ephemeral
            && !self.cleaned_up
        {
            warn!(
                "BrowserWrapper dropped without shutdown; temp profile left at {}",
                profile.path.display()
            );
        }
    }
}
