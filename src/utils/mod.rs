pub mod constants;
mod errors;
mod timeout;
mod wait_for_element;

pub use errors::{WatchError, WatchResult};
pub use timeout::validate_retry_intervals;
pub use wait_for_element::wait_for_document;
