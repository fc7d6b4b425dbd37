//! Logging and Prometheus metrics for the market bridge.
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("qbridge", LogFormat::Json)?;
//! observability::init_metrics(9100)?;
//!
//! let metrics = observability::LoopMetrics::new("macro");
//! metrics.record_success(std::time::Duration::from_millis(420));
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, LoopMetrics, PublishMetrics};
