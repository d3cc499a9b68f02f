//! Browser infrastructure for launching or attaching to Chrome

mod wrapper;

pub use crate::browser_setup::{connect_browser, launch_browser};
pub use wrapper::{BrowserOrigin, BrowserWrapper};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
