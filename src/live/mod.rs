//! Live view of a device's latest reading.
//!
//! This module merges polled and pushed readings into one freshest reading
//! per device, derives an online/offline status from it, and runs the
//! per-device feed task that drives both.

pub mod feed;
pub mod reconcile;
pub mod status;

// Re-export commonly used items
pub use feed::{latest_with_status, start_live_feed, FeedOptions, LiveFeedHandle, LiveUpdate, UpdateSource};
pub use reconcile::{supersedes, LiveReadingState, ReadingSource};
pub use status::{evaluate, offline_threshold_secs, ConnectionStatus, DEFAULT_OFFLINE_SECS_PER_DEVICE};
