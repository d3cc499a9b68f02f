//! The seam between the inspector and a live document

use std::fmt::Debug;

use async_trait::async_trait;

use super::strategy::ButtonStrategy;
use crate::utils::WatchError;

/// Read queries and the single activation the watcher needs from a page
///
/// Every call is answered from the document as it is at that moment.
/// Implementations must not cache between calls.
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Reference to a located element, valid until passed to `activate`
    type Handle: Debug + Send + Sync;

    /// Text of the first element matching `selector` whose text content
    /// contains any of `needles`, or `None` when no element qualifies.
    async fn find_text(&self, selector: &str, needles: &[String])
    -> Result<Option<String>, WatchError>;

    /// Number of elements matching `selector`
    async fn count(&self, selector: &str) -> Result<usize, WatchError>;

    /// Run one matcher spec against the document
    async fn locate(&self, strategy: &ButtonStrategy) -> Result<Option<Self::Handle>, WatchError>;

    /// Dispatch a synthetic click on a located element and release it
    async fn activate(&self, handle: Self::Handle) -> Result<(), WatchError>;
}
