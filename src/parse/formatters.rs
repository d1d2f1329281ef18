//! Test report output sinks.
//!
//! Formatters observe the test stream as it is classified. The default
//! set pairs a colored console echo with a machine-readable JSON report
//! file; callers can substitute their own list through the test stage
//! options.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use super::test_log::{TestCase, TestReport, TestStatus, TestSuite};

/// Observer of test-stream events.
///
/// Each formatter is independent: errors it returns are logged by the
/// parser and never stop the other formatters or the stream.
pub trait ReportFormatter {
    fn suite_started(&mut self, name: &str) -> io::Result<()>;
    fn suite_finished(&mut self, suite: &TestSuite) -> io::Result<()>;
    fn case_finished(&mut self, suite: &str, case: &TestCase) -> io::Result<()>;
    fn report_finished(&mut self, report: &TestReport) -> io::Result<()>;
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Human-readable colored console echo.
pub struct ConsoleFormatter {
    out: Box<dyn Write>,
    color: bool,
}

impl ConsoleFormatter {
    /// Console formatter writing to stdout with color.
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
            color: true,
        }
    }

    /// Formatter writing to an arbitrary sink, optionally colored.
    pub fn new(out: Box<dyn Write>, color: bool) -> Self {
        Self { out, color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

impl ReportFormatter for ConsoleFormatter {
    fn suite_started(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.out, "{}", self.paint(BOLD, name))
    }

    fn suite_finished(&mut self, suite: &TestSuite) -> io::Result<()> {
        let failures = suite.failure_count();
        let line = format!(
            "{} finished: {} cases, {} failed ({:.3}s)",
            suite.name,
            suite.cases.len(),
            failures,
            suite.total_duration(),
        );
        let code = if failures == 0 { GREEN } else { RED };
        writeln!(self.out, "{}", self.paint(code, &line))?;
        self.out.flush()
    }

    fn case_finished(&mut self, _suite: &str, case: &TestCase) -> io::Result<()> {
        let line = match case.status {
            TestStatus::Passed => {
                self.paint(GREEN, &format!("  ok   {} ({:.3}s)", case.name, case.duration))
            }
            TestStatus::Failed => {
                self.paint(RED, &format!("  FAIL {} ({:.3}s)", case.name, case.duration))
            }
            TestStatus::Errored => self.paint(YELLOW, &format!("  ERR  {}", case.name)),
        };
        writeln!(self.out, "{line}")?;
        if let Some(message) = &case.message {
            writeln!(self.out, "       {message}")?;
        }
        Ok(())
    }

    fn report_finished(&mut self, report: &TestReport) -> io::Result<()> {
        let failures = report.failure_count();
        let line = format!(
            "{} suites, {} cases, {} failed",
            report.suites.len(),
            report.case_count(),
            failures,
        );
        let code = if failures == 0 { GREEN } else { RED };
        writeln!(self.out, "{}", self.paint(code, &line))?;
        self.out.flush()
    }
}

/// Machine-readable JSON report writer.
///
/// The file is written once, at stream end, so an empty run still
/// produces a valid (empty) report document.
pub struct JsonFileFormatter {
    path: PathBuf,
}

impl JsonFileFormatter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportFormatter for JsonFileFormatter {
    fn suite_started(&mut self, _name: &str) -> io::Result<()> {
        Ok(())
    }

    fn suite_finished(&mut self, _suite: &TestSuite) -> io::Result<()> {
        Ok(())
    }

    fn case_finished(&mut self, _suite: &str, _case: &TestCase) -> io::Result<()> {
        Ok(())
    }

    fn report_finished(&mut self, report: &TestReport) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}
