pub mod task_metrics;

pub use task_metrics::{TaskMetrics, TaskMetricsSnapshot};
