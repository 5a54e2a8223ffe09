pub mod analysis;
pub mod app;
pub mod cadence;
pub mod config;
pub mod driver;
pub mod logsink;
pub mod source;
pub mod uri;

pub use cadence::{CadenceTracker, PollOutcome, TrackerSummary};
pub use config::{AppConfig, Cli};
pub use driver::{run_monitor, Clock, DriverOptions, StopReason, SystemClock};
pub use logsink::HourlyLogSink;
pub use source::{FrameRead, FrameSource};
