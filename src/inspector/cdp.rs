//! `PageSurface` over a chromiumoxide page
//!
//! Each query is a single `Runtime.callFunctionOn` with its selectors passed as
//! JSON arguments, so config-supplied selectors are never spliced into script
//! source.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide_cdp::cdp::js_protocol::runtime::{
    CallArgument, CallFunctionOnParams, ReleaseObjectParams, RemoteObjectId,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use super::strategy::ButtonStrategy;
use super::surface::PageSurface;
use crate::utils::WatchError;

const FIND_TEXT_JS: &str = r#"(selector, needles) => {
    for (const el of document.querySelectorAll(selector)) {
        const text = el.textContent || '';
        if (needles.some((n) => text.includes(n))) {
            return { found: true, text: text.slice(0, 200) };
        }
    }
    return { found: false, text: '' };
}"#;

const COUNT_JS: &str = "(selector) => document.querySelectorAll(selector).length";

const MARKER_ANCESTOR_JS: &str = r#"(marker, clickable) => {
    const icon = document.querySelector(marker);
    return icon ? icon.closest(clickable) : null;
}"#;

const CONTAINER_WITH_MARKER_JS: &str = r#"(container, marker) => {
    const el = document.querySelector(container);
    return el && el.querySelector(marker) ? el : null;
}"#;

const MARKUP_SCAN_JS: &str = r#"(container, text) => {
    for (const el of document.querySelectorAll(container)) {
        if (el.innerHTML.includes(text)) {
            return el;
        }
    }
    return null;
}"#;

const ACTIVATE_JS: &str = "function() { this.click(); }";

#[derive(Debug, Deserialize)]
struct TextMatch {
    found: bool,
    text: String,
}

/// Live page inspected through CDP
#[derive(Clone)]
pub struct CdpSurface {
    page: Page,
}

impl CdpSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    fn call(
        declaration: &str,
        args: &[Value],
        return_by_value: bool,
    ) -> Result<CallFunctionOnParams, WatchError> {
        let mut builder = CallFunctionOnParams::builder()
            .function_declaration(declaration)
            .return_by_value(return_by_value);
        for arg in args {
            builder = builder.argument(CallArgument::builder().value(arg.clone()).build());
        }
        builder
            .build()
            .map_err(|e| WatchError::Cdp(format!("Failed to build call params: {e}")))
    }

    /// The call that runs one regenerate strategy, returning the element by reference
    fn locate_call(strategy: &ButtonStrategy) -> Result<CallFunctionOnParams, WatchError> {
        match strategy {
            ButtonStrategy::MarkerAncestor { marker, clickable } => {
                Self::call(MARKER_ANCESTOR_JS, &[json!(marker), json!(clickable)], false)
            }
            ButtonStrategy::ContainerWithMarker { container, marker } => Self::call(
                CONTAINER_WITH_MARKER_JS,
                &[json!(container), json!(marker)],
                false,
            ),
            ButtonStrategy::MarkupScan { container, text } => {
                Self::call(MARKUP_SCAN_JS, &[json!(container), json!(text)], false)
            }
        }
    }
}

#[async_trait]
impl PageSurface for CdpSurface {
    type Handle = RemoteObjectId;

    async fn find_text(
        &self,
        selector: &str,
        needles: &[String],
    ) -> Result<Option<String>, WatchError> {
        let call = Self::call(FIND_TEXT_JS, &[json!(selector), json!(needles)], true)?;
        let matched: TextMatch = self
            .page
            .evaluate_function(call)
            .await?
            .into_value()
            .map_err(|e| WatchError::Script(format!("Unexpected text match result: {e}")))?;

        Ok(matched.found.then_some(matched.text))
    }

    async fn count(&self, selector: &str) -> Result<usize, WatchError> {
        let call = Self::call(COUNT_JS, &[json!(selector)], true)?;
        self.page
            .evaluate_function(call)
            .await?
            .into_value::<usize>()
            .map_err(|e| WatchError::Script(format!("Unexpected count result: {e}")))
    }

    async fn locate(&self, strategy: &ButtonStrategy) -> Result<Option<RemoteObjectId>, WatchError> {
        let call = Self::locate_call(strategy)?;
        let result = self.page.evaluate_function(call).await?;
        let handle = result.object().object_id.clone();
        trace!(strategy = strategy.label(), found = handle.is_some(), "Locate finished");
        Ok(handle)
    }

    async fn activate(&self, handle: RemoteObjectId) -> Result<(), WatchError> {
        let click = CallFunctionOnParams::builder()
            .function_declaration(ACTIVATE_JS)
            .object_id(handle.clone())
            .build()
            .map_err(|e| WatchError::Cdp(format!("Failed to build click params: {e}")))?;

        let outcome = self.page.execute(click).await;

        // Release even when the click failed, the handle is single-use.
        if let Err(e) = self.page.execute(ReleaseObjectParams::new(handle)).await {
            debug!("Failed to release element handle: {}", e);
        }

        let response = outcome?;
        if let Some(details) = &response.result.exception_details {
            return Err(WatchError::Script(format!(
                "Click threw: {}",
                details.text
            )));
        }
        Ok(())
    }
}
