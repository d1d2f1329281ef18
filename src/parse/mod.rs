//! Streaming line parsers for external tool output.
//!
//! A running tool's output is consumed one line at a time, never
//! buffered whole: the operator wants live progress, and a usable
//! partial result must survive a tool that dies mid-run. Two parsers
//! share the [`LineParser`] shape:
//!
//! - [`BuildLogParser`] classifies build output into normal / warning /
//!   error lines and records the terminal build outcome.
//! - [`TestLogParser`] assembles a suite/case tree from test-runner
//!   output and fans events out to registered formatters.
//!
//! Contract: `feed` never fails — unrecognized lines are ignored, not
//! fatal. `flush` is total and safe on a parser that saw zero lines; it
//! force-closes anything left open by an unexpected end of stream, so a
//! failure while processing output can never mask the tool's real exit
//! status.

mod build_log;
mod formatters;
mod test_log;

pub use build_log::{BuildLog, BuildLogParser, BuildOutcome, LineKind};
pub use formatters::{ConsoleFormatter, JsonFileFormatter, ReportFormatter};
pub use test_log::{TestCase, TestLogParser, TestReport, TestStatus, TestSuite};

/// Incremental consumer of process output lines.
pub trait LineParser {
    /// Process one line, updating internal state. Never fails.
    fn feed(&mut self, line: &str);

    /// Close anything left open after the line source is exhausted.
    /// Safe to call on an empty stream; repeated calls are no-ops.
    fn flush(&mut self);
}
