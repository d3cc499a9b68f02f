//! Shared configuration constants for the watcher
//!
//! Default values for the target page and the backoff cycle live here so the
//! config layer, the CLI and the tests agree on them.

/// Chrome user agent string for launched browsers
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Chat page watched when no URL is configured
pub const DEFAULT_TARGET_URL: &str = "https://chat.deepseek.com/";

/// Delay sequence between wake-ups, indexed by the backoff index
pub const DEFAULT_RETRY_INTERVALS_MS: [u64; 3] = [1_000, 5_000, 20_000];

/// Regenerate clicks allowed per session before the cycle refuses to start
pub const DEFAULT_MAX_CLICKS: u32 = 5;

/// Phrases the chat page shows when the backend declined the request
pub const DEFAULT_ERROR_PHRASES: [&str; 2] = ["服务器繁忙", "请稍后再试"];

/// Elements whose text is searched for the error phrases
pub const DEFAULT_ERROR_TEXT_SELECTOR: &str = "div";

/// Spinner / loading markers shown while a response streams in
pub const DEFAULT_LOADING_SELECTOR: &str = r#"div[class*="loading"], div[class*="spinner"]"#;

/// Chat message containers
pub const DEFAULT_MESSAGE_SELECTOR: &str = r#"div[class*="message"]"#;

/// Icon carrying the regenerate label as its id
pub const REGENERATE_ICON_SELECTOR: &str = r#"rect[id="重新生成"]"#;

/// Icon nested inside an icon button
pub const REGENERATE_NESTED_ICON_SELECTOR: &str = r#"svg rect[id="重新生成"]"#;

/// Elements that accept a click on behalf of the icon
pub const CLICKABLE_ANCESTOR_SELECTOR: &str =
    r#"button, div[class*="ds-icon-button"], div[role="button"]"#;

/// Icon button containers on the chat page
pub const ICON_BUTTON_SELECTOR: &str = r#"div[class*="ds-icon-button"]"#;

/// Text the regenerate icon carries somewhere in its markup
pub const REGENERATE_MARKER_TEXT: &str = "重新生成";

/// Name of the page-side binding the mutation observer calls
pub const MUTATION_BINDING: &str = "__regenWatchNotify";

/// How long to wait for the target document after navigation
pub const DOCUMENT_READY_TIMEOUT_MS: u64 = 30_000;
