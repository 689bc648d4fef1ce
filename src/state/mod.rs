//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: phase of the per-shard pagination state machine
//! - `Termination`: why a traversal stopped
//! - `CrawlCursor`: the traversal pointer owned by the coordinator

mod crawl_state;
mod cursor;

// Re-export main types
pub use crawl_state::{CrawlState, Termination};
pub use cursor::CrawlCursor;
