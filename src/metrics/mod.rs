pub mod cache; // Single-snapshot consistency cache
pub mod pipeline;
pub mod snapshot;
pub mod yield_calc; // The only yield math in the crate

pub use cache::{CacheStatus, MetricsCache, RefreshFailure};
pub use pipeline::{compute_snapshot, MetricsPipeline, RefreshInputs, SnapshotSource};
pub use snapshot::{ChartPoint, HighestApy, MetricsSnapshot, PersonalYield, YieldMetrics};
pub use yield_calc::{compute_yield, yield_share, YieldFigures};
