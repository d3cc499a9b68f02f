//! Document polling after navigation
//!
//! Chat pages are SPAs: the load event fires long before the app mounts its
//! body. The mutation observer needs a body to attach to, so the watcher waits
//! for one here.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::debug;

use crate::utils::errors::WatchError;

/// Wait until the page has a `document.body` using exponential backoff polling
///
/// # Arguments
/// * `page` - The chromiumoxide Page to poll
/// * `timeout` - Maximum time to wait
///
/// # Polling Strategy
/// - Starts at 100ms intervals
/// - Doubles each retry, capped at 1 second
/// - Total duration limited by timeout parameter
pub async fn wait_for_document(page: &Page, timeout: Duration) -> Result<(), WatchError> {
    let start = tokio::time::Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        let ready = page
            .evaluate("document.readyState !== 'loading' && document.body !== null")
            .await
            .ok()
            .and_then(|result| result.into_value::<bool>().ok())
            .unwrap_or(false);

        if ready {
            debug!("Document ready after {}ms", start.elapsed().as_millis());
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(WatchError::DocumentTimeout(timeout.as_millis()));
        }

        tokio::time::sleep(poll_interval).await;
        poll_interval = (poll_interval * 2).min(max_interval);
    }
}
