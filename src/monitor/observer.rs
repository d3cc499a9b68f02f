//! Page-side mutation observer wired to a CDP binding
//!
//! The observer runs inside the page and calls a `Runtime.addBinding` function
//! once per mutation batch. The binding surfaces on our side as
//! `Runtime.bindingCalled` events, which become the mutation feed.

use std::pin::Pin;

use chromiumoxide::Page;
use chromiumoxide_cdp::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide_cdp::cdp::js_protocol::runtime::{
    AddBindingParams, EvaluateParams, EventBindingCalled,
};
use futures::{Stream, StreamExt, future};
use tracing::info;

use super::MutationBatch;
use crate::utils::WatchError;

/// Stream of mutation batches from the watched page
pub type MutationFeed = Pin<Box<dyn Stream<Item = MutationBatch> + Send>>;

/// Script installing a single observer over the whole document
///
/// Guarded so evaluating it twice in one document attaches only one observer.
pub fn observer_script(binding: &str) -> String {
    let binding = serde_json::Value::String(binding.to_string());
    format!(
        r#"(() => {{
    if (window.__regenWatchObserver) {{
        return;
    }}
    window.__regenWatchObserver = true;
    const notify = (records) => {{
        try {{
            window[{binding}](String(records.length));
        }} catch (_) {{}}
    }};
    const attach = () => {{
        const target = document.body || document.documentElement;
        new MutationObserver(notify).observe(target, {{
            childList: true,
            subtree: true,
            characterData: true,
            attributes: true,
        }});
    }};
    if (document.readyState === 'loading') {{
        document.addEventListener('DOMContentLoaded', attach);
    }} else {{
        attach();
    }}
}})()"#
    )
}

/// Install the observer on `page` (now and on every later document) and
/// return the feed of batches it reports
pub async fn install_mutation_feed(page: &Page, binding: &str) -> Result<MutationFeed, WatchError> {
    // Subscribe before the binding exists so no early batch is missed.
    let events = page.event_listener::<EventBindingCalled>().await?;

    page.execute(AddBindingParams::new(binding)).await?;

    let script = observer_script(binding);
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
        .await?;
    page.execute(EvaluateParams::new(script)).await?;

    info!("DOM observer started");

    let binding = binding.to_string();
    let feed = events.filter_map(move |event| {
        let batch = (event.name == binding).then(|| MutationBatch::from_payload(&event.payload));
        future::ready(batch)
    });

    Ok(Box::pin(feed))
}
