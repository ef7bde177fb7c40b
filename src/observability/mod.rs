//! Observability module
//!
//! Logging, metrics, and the structured event stream for governance
//! sessions.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter, StopReason};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
