use thiserror::Error;

use crate::browser::BrowserError;

/// Errors raised outside the retry state machine
///
/// The controller itself never returns these: page queries that fail are
/// logged and read as "nothing found".
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("CDP command failed: {0}")]
    Cdp(String),

    #[error("Page script error: {0}")]
    Script(String),

    #[error("Document not ready after {0}ms")]
    DocumentTimeout(u128),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl From<BrowserError> for WatchError {
    fn from(err: BrowserError) -> Self {
        WatchError::Browser(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for WatchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        WatchError::Cdp(err.to_string())
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
