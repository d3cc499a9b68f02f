//! Browser lifecycle for the watcher
//!
//! Holds at most one browser, launched or attached according to config, and
//! hands out the tab being watched.
//!
//! # Async Lock Requirements
//!
//! Must use `tokio::sync::Mutex`: browser operations are async and the lock is
//! held across `.await` points during launch and shutdown.

use chromiumoxide::page::Page;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::BrowserConfig;
use crate::browser::{
    BrowserError, BrowserOrigin, BrowserResult, BrowserWrapper, connect_browser, launch_browser,
};

/// Owner of the watcher's browser with health checking and crash recovery
///
/// `get_or_launch()` checks the browser with a `version()` CDP call every
/// time; a browser that stopped answering is closed and replaced.
pub struct BrowserManager {
    config: BrowserConfig,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
}

impl BrowserManager {
    /// Browser is launched (or attached) lazily on first `get_or_launch()`.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the browser, starting or reconnecting it if needed
    ///
    /// # Recovery Flow
    /// 1. Lock browser mutex
    /// 2. If a browser exists, check health via `version()`
    /// 3. If unhealthy, close it (launched only) and drop it
    /// 4. Launch, or attach when `connect_url` is configured
    pub async fn get_or_launch(&self) -> BrowserResult<Arc<Mutex<Option<BrowserWrapper>>>> {
        let mut guard = self.browser.lock().await;

        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    debug!("Browser health check passed, reusing existing browser");
                    drop(guard);
                    return Ok(self.browser.clone());
                }
                Err(e) => {
                    warn!("Browser health check failed: {}. Triggering recovery...", e);
                    if let Some(mut crashed) = guard.take() {
                        if !crashed.is_attached() {
                            // Best-effort, the process may already be gone.
                            let _ = crashed.browser_mut().close().await;
                            let _ = crashed.browser_mut().wait().await;
                        }
                        crashed.cleanup_profile();
                    }
                }
            }
        }

        let wrapper = match &self.config.connect_url {
            Some(url) => {
                let (browser, handler) = connect_browser(url)
                    .await
                    .map_err(|e| BrowserError::ConnectFailed(format!("{e:#}")))?;
                BrowserWrapper::new(browser, handler, BrowserOrigin::Attached)
            }
            None => {
                info!("Launching browser (first time or after recovery)");
                let (browser, handler, profile) = launch_browser(&self.config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(format!("{e:#}")))?;
                BrowserWrapper::new(browser, handler, BrowserOrigin::Launched(profile))
            }
        };
        *guard = Some(wrapper);
        drop(guard);

        Ok(self.browser.clone())
    }

    /// Open a new tab on `target` and wait for the navigation to finish
    ///
    /// In an attached browser the tab shares the user's profile, so an existing
    /// chat login carries over.
    pub async fn open_target_page(&self, target: &Url) -> BrowserResult<Page> {
        let browser_arc = self.get_or_launch().await?;
        let guard = browser_arc.lock().await;
        let wrapper = guard
            .as_ref()
            .ok_or_else(|| BrowserError::PageCreationFailed("Browser not available".into()))?;

        let page = wrapper
            .browser()
            .new_page(target.as_str())
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        info!("Opened {}", target);
        Ok(page)
    }

    /// Shut the browser down
    ///
    /// A launched browser is closed and waited for, then its ephemeral profile
    /// removed. An attached browser is only disconnected. Safe to call twice.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            if wrapper.is_attached() {
                info!("Disconnecting from attached browser");
            } else {
                info!("Shutting down browser");
                if let Err(e) = wrapper.browser_mut().close().await {
                    warn!("Failed to close browser cleanly: {}", e);
                }
                if let Err(e) = wrapper.browser_mut().wait().await {
                    warn!("Failed to wait for browser exit: {}", e);
                }
            }
            wrapper.cleanup_profile();
        }

        Ok(())
    }
}
