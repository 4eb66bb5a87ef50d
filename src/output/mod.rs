//! Output abstraction layer that routes to rich or plain output based on mode.

pub mod context;
pub mod table;
pub mod theme;

pub use context::{OutputContext, OutputMode, RecordingReporter, Reporter, SilentReporter};
pub use table::SummaryTable;
pub use theme::Theme;
