//! Data access: the store contract, its in-memory implementation and the
//! history helpers built on top of it.

pub mod history;
pub mod memory;
pub mod traits;

// Re-export commonly used items
pub use history::{
    daily_trends, dashboard_summary, day_bounds, deployment_stats, deployment_stats_by_device,
    history_log, DashboardSummary, DeploymentStats, DeviceOverview, LogEntry, TrendPoint,
    ValueStats, DEFAULT_HISTORY_LIMIT,
};
pub use memory::{MemoryStore, DEFAULT_READING_CAP};
pub use traits::{DataStore, Order, ReadingQuery, MAX_QUERY_LIMIT};
