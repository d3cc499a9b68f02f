//! Busy-server regenerate watcher
//!
//! Watches a chat tab over CDP. When the page reports that the server is busy,
//! the watcher clicks the page's regenerate control on a fixed backoff
//! schedule until normal output shows up or the click cap is reached.

mod browser;
pub mod browser_setup;
pub mod controller;
pub mod inspector;
mod manager;
pub mod monitor;
mod utils;
pub mod watcher;

use anyhow::Context;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::controller::{BackoffSchedule, IdlePolicy, RetryController, SessionSnapshot};
use crate::inspector::{ButtonStrategy, CdpSurface, PageInspector, default_regenerate_strategies};
use crate::monitor::install_mutation_feed;
use crate::utils::constants::{
    DEFAULT_ERROR_PHRASES, DEFAULT_ERROR_TEXT_SELECTOR, DEFAULT_LOADING_SELECTOR,
    DEFAULT_MAX_CLICKS, DEFAULT_MESSAGE_SELECTOR, DEFAULT_RETRY_INTERVALS_MS, DEFAULT_TARGET_URL,
    DOCUMENT_READY_TIMEOUT_MS, MUTATION_BINDING,
};
use crate::watcher::{WatchCommand, Watcher};

pub use browser::{BrowserError, BrowserResult, BrowserWrapper};
pub use manager::BrowserManager;
pub use utils::{WatchError, WatchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Chat page to open and watch
    #[serde(default = "default_url")]
    pub url: String,

    /// Regenerate clicks allowed per session; `null` removes the cap
    #[serde(default = "default_max_clicks")]
    pub max_clicks: Option<u32>,

    /// Delays between checks, advanced after every error-driven retry
    #[serde(default = "default_retry_intervals_ms")]
    pub retry_intervals_ms: Vec<u64>,

    #[serde(default)]
    pub idle_policy: IdlePolicy,

    #[serde(default)]
    pub page: PageProfile,

    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Everything that ties the watcher to one particular chat page's markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageProfile {
    /// Phrases whose presence means the backend declined the request
    #[serde(default = "default_error_phrases")]
    pub error_phrases: Vec<String>,

    #[serde(default = "default_error_text_selector")]
    pub error_text_selector: String,

    #[serde(default = "default_loading_selector")]
    pub loading_selector: String,

    #[serde(default = "default_message_selector")]
    pub message_selector: String,

    /// Tried in order; the first strategy that finds a control wins
    #[serde(default = "default_regenerate_strategies")]
    pub regenerate: Vec<ButtonStrategy>,
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default)]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default)]
    pub disable_security: bool,

    #[serde(default)]
    pub window: WindowConfig,

    /// Chrome profile directory; overrides `persist_profile`
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,

    /// Keep the profile (and the chat login) in the user data directory
    #[serde(default = "default_persist_profile")]
    pub persist_profile: bool,

    /// Attach to a running Chrome instead of launching one
    #[serde(default)]
    pub connect_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

fn default_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}
fn default_max_clicks() -> Option<u32> {
    Some(DEFAULT_MAX_CLICKS)
}
fn default_retry_intervals_ms() -> Vec<u64> {
    DEFAULT_RETRY_INTERVALS_MS.to_vec()
}
fn default_error_phrases() -> Vec<String> {
    DEFAULT_ERROR_PHRASES.iter().map(|s| s.to_string()).collect()
}
fn default_error_text_selector() -> String {
    DEFAULT_ERROR_TEXT_SELECTOR.to_string()
}
fn default_loading_selector() -> String {
    DEFAULT_LOADING_SELECTOR.to_string()
}
fn default_message_selector() -> String {
    DEFAULT_MESSAGE_SELECTOR.to_string()
}

fn default_persist_profile() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    900
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_clicks: default_max_clicks(),
            retry_intervals_ms: default_retry_intervals_ms(),
            idle_policy: IdlePolicy::default(),
            page: PageProfile::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            error_phrases: default_error_phrases(),
            error_text_selector: default_error_text_selector(),
            loading_selector: default_loading_selector(),
            message_selector: default_message_selector(),
            regenerate: default_regenerate_strategies(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            disable_security: false,
            window: WindowConfig::default(),
            user_data_dir: None,
            persist_profile: default_persist_profile(),
            connect_url: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl WatchConfig {
    /// Check the values serde cannot: URL syntax, cap, delays, page profile
    pub fn validate(&self) -> Result<(), WatchError> {
        Url::parse(&self.url)
            .map_err(|e| WatchError::Config(format!("url '{}' is invalid: {}", self.url, e)))?;

        if self.max_clicks == Some(0) {
            return Err(WatchError::Config(
                "max_clicks must be at least 1 (use null for no cap)".to_string(),
            ));
        }

        BackoffSchedule::from_millis(&self.retry_intervals_ms)?;

        if self.page.error_phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(WatchError::Config(
                "page.error_phrases must contain at least one phrase".to_string(),
            ));
        }
        if self.page.regenerate.is_empty() {
            return Err(WatchError::Config(
                "page.regenerate must list at least one strategy".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target_url(&self) -> Result<Url, WatchError> {
        Url::parse(&self.url)
            .map_err(|e| WatchError::Config(format!("url '{}' is invalid: {}", self.url, e)))
    }
}

/// `<config_dir>/regen-watch/config.yaml`, when the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("regen-watch").join("config.yaml"))
}

/// Load config from YAML
///
/// An explicit `path` must exist. Without one, the default location is used if
/// present, otherwise built-in defaults.
pub fn load_yaml_config(path: Option<&Path>) -> anyhow::Result<WatchConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(WatchConfig::default()),
        },
    };

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config {}", config_path.display()))?;
    let config: WatchConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", config_path.display()))?;
    info!("Loaded config from {}", config_path.display());
    Ok(config)
}

/// Open the target page and watch it until `shutdown` fires or the tab closes
///
/// The browser is shut down (or disconnected, when attached) before returning.
pub async fn run<C>(
    config: WatchConfig,
    commands: C,
    shutdown: CancellationToken,
) -> anyhow::Result<SessionSnapshot>
where
    C: Stream<Item = WatchCommand> + Unpin,
{
    config.validate()?;
    let manager = BrowserManager::new(config.browser.clone());

    let outcome = watch_target(&manager, &config, commands, shutdown).await;

    manager.shutdown().await?;
    outcome
}

async fn watch_target<C>(
    manager: &BrowserManager,
    config: &WatchConfig,
    commands: C,
    shutdown: CancellationToken,
) -> anyhow::Result<SessionSnapshot>
where
    C: Stream<Item = WatchCommand> + Unpin,
{
    let target = config.target_url()?;
    let schedule = BackoffSchedule::from_millis(&config.retry_intervals_ms)?;

    let page = manager.open_target_page(&target).await?;
    utils::wait_for_document(&page, Duration::from_millis(DOCUMENT_READY_TIMEOUT_MS)).await?;

    let mutations = install_mutation_feed(&page, MUTATION_BINDING).await?;

    let inspector = PageInspector::new(CdpSurface::new(page), config.page.clone());
    let controller = RetryController::new(inspector, schedule, config.max_clicks, config.idle_policy);

    Ok(Watcher::new(controller)
        .run(mutations, commands, shutdown)
        .await)
}
