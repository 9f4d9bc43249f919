//! File sinks: append-only logs, structured JSON/SRT artifacts.

pub mod logs;
pub mod structured;

pub use logs::AppendLog;
pub use structured::StructuredOutput;
