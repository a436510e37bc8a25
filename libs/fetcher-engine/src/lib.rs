pub mod consume;
pub mod error;
pub mod liveness;
pub mod reporter;
pub mod session;
pub mod shutdown;
pub mod stats;

pub use consume::{LoopConfig, StopReason, consume};
pub use error::EngineError;
pub use liveness::LivenessTracker;
pub use reporter::{StatsReporter, spawn_reporter};
pub use session::{SessionOptions, SessionSummary, run_session};
pub use shutdown::install_signal_listener;
pub use stats::{RunStats, StatsSnapshot};
