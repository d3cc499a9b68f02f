use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::handler::Handler;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::BrowserConfig;
use crate::utils::constants::CHROME_USER_AGENT;

/// Chrome profile directory used by a launched browser
///
/// Ephemeral profiles are removed when the browser goes away (or when launch
/// fails). Persistent profiles keep the chat login between runs and are never
/// touched.
#[derive(Debug, Clone)]
pub struct ProfileDir {
    pub path: PathBuf,
    pub ephemeral: bool,
}

impl ProfileDir {
    /// Pick the profile for a launch: the configured directory, else the
    /// shared persistent one, else a per-process temp directory.
    pub fn resolve(config: &BrowserConfig) -> Self {
        if let Some(path) = &config.user_data_dir {
            return Self {
                path: path.clone(),
                ephemeral: false,
            };
        }
        if config.persist_profile
            && let Some(data) = dirs::data_local_dir()
        {
            return Self {
                path: data.join("regen-watch").join("profile"),
                ephemeral: false,
            };
        }
        Self {
            path: std::env::temp_dir().join(format!("regen_watch_chrome_{}", std::process::id())),
            ephemeral: true,
        }
    }

    /// Remove the directory if it is ephemeral
    pub fn cleanup(&self) {
        if !self.ephemeral {
            return;
        }
        info!("Cleaning up temp profile: {}", self.path.display());
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(
                "Failed to clean up temp profile {}: {}. Manual cleanup may be required.",
                self.path.display(),
                e
            );
        }
    }
}

/// Removes an ephemeral profile on drop unless the launch succeeded
struct LaunchGuard {
    profile: ProfileDir,
    armed: bool,
}

impl LaunchGuard {
    fn new(profile: ProfileDir) -> Result<Self> {
        std::fs::create_dir_all(&profile.path).context("Failed to create user data directory")?;
        Ok(Self {
            profile,
            armed: true,
        })
    }

    fn disarm(mut self) -> ProfileDir {
        self.armed = false;
        self.profile.clone()
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        if self.armed {
            self.profile.cleanup();
        }
    }
}

fn candidate_paths() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    }
}

fn expand_candidate(raw: &str) -> Option<PathBuf> {
    if let Some(rest) = raw.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    if raw.contains('%') {
        return Some(PathBuf::from(expand_windows_env_vars(raw)));
    }
    Some(PathBuf::from(raw))
}

/// Find Chrome/Chromium on this machine
///
/// `CHROMIUM_PATH` wins when it points at a file; then the platform's usual
/// install locations; then `which` on Unix.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH points to a non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = candidate_paths()
        .iter()
        .filter_map(|raw| expand_candidate(raw))
        .find(|path| path.exists())
    {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if !cfg!(target_os = "windows") {
        for cmd in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !found.is_empty() {
                    info!("Found browser using 'which': {}", found);
                    return Ok(PathBuf::from(found));
                }
            }
        }
    }

    warn!("No Chrome/Chromium executable found. Will download a managed browser.");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Replace `%VAR%` tokens with environment values, keeping unknown tokens
fn expand_windows_env_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Download a managed Chromium into the user cache and return its executable
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::env::temp_dir().join(".cache"))
        .join("regen-watch")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to fetch browser")?;

    info!("Downloaded Chromium to: {}", revision.folder_path.display());
    Ok(revision.executable_path)
}

/// Drive the CDP connection in the background
///
/// chromiumoxide only makes progress while its handler is polled.
fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                // Chrome emits events chromiumoxide cannot deserialize; they are harmless.
                // https://github.com/mattsse/chromiumoxide/issues/167
                let benign = message.contains("data did not match any variant of untagged enum Message")
                    || message.contains("Failed to deserialize WS response");
                if benign {
                    trace!("Suppressed benign CDP serialization error: {}", message);
                } else {
                    error!("Browser handler error: {:?}", e);
                }
            }
        }
        info!("Browser handler task completed");
    })
}

/// Launch Chrome for the watcher
///
/// Runs headed by default: the chat page needs a human login the first time.
pub async fn launch_browser(config: &BrowserConfig) -> Result<(Browser, JoinHandle<()>, ProfileDir)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let guard = LaunchGuard::new(ProfileDir::resolve(config))?;

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(config.window.width, config.window.height)
        .user_data_dir(guard.profile.path.clone())
        .chrome_executable(chrome_path);

    builder = if config.headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    builder = builder
        .arg(format!("--user-agent={}", CHROME_USER_AGENT))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        // Timer throttling in background tabs would stretch the backoff delays.
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-renderer-backgrounding")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain");

    if config.disable_security {
        info!("WARNING: Disabling browser security features (disable_security=true)");
        builder = builder
            .arg("--disable-web-security")
            .arg("--ignore-certificate-errors");
    }

    if config.disable_security || should_disable_sandbox() {
        info!("Disabling Chrome sandbox");
        builder = builder.arg("--no-sandbox").arg("--disable-setuid-sandbox");
    }

    let browser_config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    info!("Launching browser with profile {}", guard.profile.path.display());
    let (browser, handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    Ok((browser, spawn_handler(handler), guard.disarm()))
}

/// Attach to a Chrome started with `--remote-debugging-port`
///
/// Accepts the `ws://` debugger URL or the `http://host:port` endpoint.
pub async fn connect_browser(debugger_url: &str) -> Result<(Browser, JoinHandle<()>)> {
    info!("Connecting to running browser at {}", debugger_url);
    let (browser, handler) = Browser::connect(debugger_url)
        .await
        .with_context(|| format!("Failed to connect to browser at {debugger_url}"))?;
    Ok((browser, spawn_handler(handler)))
}

/// Detect if running in containerized environment (Docker, etc.)
/// In containers, sandbox must be disabled as setuid doesn't work
fn should_disable_sandbox() -> bool {
    std::path::Path::new("/.dockerenv").exists()
        || std::env::var("container").is_ok()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_env_tokens_are_preserved() {
        assert_eq!(
            expand_windows_env_vars(r"%REGEN_WATCH_SURELY_UNSET%\chrome.exe"),
            r"%REGEN_WATCH_SURELY_UNSET%\chrome.exe"
        );
        assert_eq!(expand_windows_env_vars("100%"), "100%");
        assert_eq!(expand_windows_env_vars("no tokens"), "no tokens");
    }

    #[test]
    fn known_env_tokens_expand() {
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(expand_windows_env_vars("%PATH%/x"), format!("{path}/x"));
        }
    }

    #[test]
    fn configured_profile_is_persistent() {
        let config = BrowserConfig {
            user_data_dir: Some(PathBuf::from("/tmp/regen-profile")),
            ..BrowserConfig::default()
        };
        let profile = ProfileDir::resolve(&config);
        assert_eq!(profile.path, PathBuf::from("/tmp/regen-profile"));
        assert!(!profile.ephemeral);
    }

    #[test]
    fn non_persistent_profile_is_ephemeral() {
        let config = BrowserConfig {
            persist_profile: false,
            ..BrowserConfig::default()
        };
        assert!(ProfileDir::resolve(&config).ephemeral);
    }
}
