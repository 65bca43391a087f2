//! State module for tracking crawl message progress
//!
//! # Components
//!
//! - `AttemptState`: the lifecycle of a crawl message in the fetch stage
//!   (pending, fetching, retrying, succeeded, dead-lettered)

mod attempt_state;

pub use attempt_state::AttemptState;
