//! Test-runner output parsing.
//!
//! Assembles a [`TestReport`] from OCUnit-style runner output:
//!
//! ```text
//! Test Suite 'DemoTests' started at 2014-01-01 12:00:00 +0000
//! Test Case '-[DemoTests testAdds]' started.
//! Test Case '-[DemoTests testAdds]' passed (0.001 seconds).
//! /path/DemoTests.m:24: error: -[DemoTests testFails] : expected 2, got 3
//! Test Case '-[DemoTests testFails]' failed (0.002 seconds).
//! Test Suite 'DemoTests' finished at 2014-01-01 12:00:01 +0000
//! ```
//!
//! Suites are recorded in the order first observed. A case that was
//! started but never reported passed or failed (runner crash, stream
//! cut) is closed as [`TestStatus::Errored`] by `flush`.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::Serialize;

use super::formatters::ReportFormatter;
use super::LineParser;

/// Outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
}

/// One executed test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    pub name: String,
    pub status: TestStatus,
    /// Wall-clock duration in seconds as reported by the runner.
    pub duration: f64,
    /// Failure message, when the runner reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Ordered collection of cases sharing a suite.
#[derive(Debug, Clone, Serialize)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn failure_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.status != TestStatus::Passed)
            .count()
    }

    pub fn total_duration(&self) -> f64 {
        self.cases.iter().map(|c| c.duration).sum()
    }
}

/// Aggregate result of one test stage, ordered by first observation.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub created_at: DateTime<Utc>,
    pub suites: Vec<TestSuite>,
}

impl TestReport {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            suites: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    pub fn case_count(&self) -> usize {
        self.suites.iter().map(|s| s.cases.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.suites.iter().map(TestSuite::failure_count).sum()
    }

    /// True when every observed case passed.
    pub fn succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}

impl Default for TestReport {
    fn default() -> Self {
        Self::new()
    }
}

/// A case that has started but not yet reported a result.
#[derive(Debug)]
struct OpenCase {
    suite: String,
    name: String,
    message: Option<String>,
}

struct Grammar {
    suite_started: Regex,
    suite_finished: Regex,
    case_started: Regex,
    case_passed: Regex,
    case_failed: Regex,
    case_error: Regex,
}

impl Grammar {
    fn new() -> Self {
        // These patterns are fixed at compile time; construction cannot
        // fail at runtime.
        Self {
            suite_started: Regex::new(r"Test Suite '(.+?)' started").unwrap(),
            suite_finished: Regex::new(r"Test Suite '(.+?)' (?:finished|passed|failed)").unwrap(),
            case_started: Regex::new(r"Test Case '-\[(\S+) (\S+)\]' started").unwrap(),
            case_passed: Regex::new(
                r"Test Case '-\[(\S+) (\S+)\]' passed \((\d+(?:\.\d+)?) seconds\)",
            )
            .unwrap(),
            case_failed: Regex::new(
                r"Test Case '-\[(\S+) (\S+)\]' failed \((\d+(?:\.\d+)?) seconds\)",
            )
            .unwrap(),
            case_error: Regex::new(r"error: -\[(\S+) (\S+)\] : (.*)$").unwrap(),
        }
    }
}

/// Streaming parser for test-runner output with formatter fan-out.
///
/// Formatters are independent observers: a failure in one is logged and
/// does not prevent the others from receiving the event.
pub struct TestLogParser {
    grammar: Grammar,
    report: TestReport,
    formatters: Vec<Box<dyn ReportFormatter>>,
    open_case: Option<OpenCase>,
    current_suite: Option<usize>,
    flushed: bool,
}

impl TestLogParser {
    pub fn new(formatters: Vec<Box<dyn ReportFormatter>>) -> Self {
        Self {
            grammar: Grammar::new(),
            report: TestReport::new(),
            formatters,
            open_case: None,
            current_suite: None,
            flushed: false,
        }
    }

    pub fn report(&self) -> &TestReport {
        &self.report
    }

    pub fn into_report(self) -> TestReport {
        self.report
    }

    /// Index of the suite with `name`, creating it (and notifying
    /// formatters) on first observation.
    fn suite_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.report.suites.iter().position(|s| s.name == name) {
            return idx;
        }
        self.report.suites.push(TestSuite {
            name: name.to_string(),
            cases: Vec::new(),
        });
        let idx = self.report.suites.len() - 1;
        Self::notify(&mut self.formatters, |f| f.suite_started(name));
        idx
    }

    fn close_case(&mut self, suite: &str, name: &str, status: TestStatus, duration: f64) {
        let message = match self.open_case.take() {
            Some(open) if open.suite == suite && open.name == name => open.message,
            open => {
                // Result for a case we never saw start; put any pending
                // open case back and record the result anyway.
                self.open_case = open;
                None
            }
        };

        let idx = self.suite_index(suite);
        let case = TestCase {
            name: name.to_string(),
            status,
            duration,
            message,
        };
        self.report.suites[idx].cases.push(case);
        let case_ref = self.report.suites[idx].cases.last().unwrap();
        Self::notify(&mut self.formatters, |f| f.case_finished(suite, case_ref));
    }

    /// A case that started but never reported a result is an error,
    /// not a pass.
    fn abandon_open_case(&mut self) {
        if let Some(open) = self.open_case.take() {
            let idx = self.suite_index(&open.suite);
            self.report.suites[idx].cases.push(TestCase {
                name: open.name,
                status: TestStatus::Errored,
                duration: 0.0,
                message: open.message,
            });
            let suite_name = self.report.suites[idx].name.clone();
            let case_ref = self.report.suites[idx].cases.last().unwrap();
            Self::notify(&mut self.formatters, |f| {
                f.case_finished(&suite_name, case_ref)
            });
        }
    }

    fn finish_current_suite(&mut self) {
        if let Some(idx) = self.current_suite.take() {
            let suite = &self.report.suites[idx];
            Self::notify(&mut self.formatters, |f| f.suite_finished(suite));
        }
    }

    fn notify<F>(formatters: &mut [Box<dyn ReportFormatter>], mut event: F)
    where
        F: FnMut(&mut dyn ReportFormatter) -> std::io::Result<()>,
    {
        for formatter in formatters {
            if let Err(err) = event(formatter.as_mut()) {
                tracing::warn!(error = %err, "test report formatter failed");
            }
        }
    }
}

impl LineParser for TestLogParser {
    fn feed(&mut self, line: &str) {
        if let Some(caps) = self.grammar.case_passed.captures(line) {
            let duration = caps[3].parse().unwrap_or(0.0);
            let (suite, name) = (caps[1].to_string(), caps[2].to_string());
            self.close_case(&suite, &name, TestStatus::Passed, duration);
        } else if let Some(caps) = self.grammar.case_failed.captures(line) {
            let duration = caps[3].parse().unwrap_or(0.0);
            let (suite, name) = (caps[1].to_string(), caps[2].to_string());
            self.close_case(&suite, &name, TestStatus::Failed, duration);
        } else if let Some(caps) = self.grammar.case_error.captures(line) {
            // Failure detail precedes the case's "failed" line; hold it
            // on the open case until the result arrives.
            match &mut self.open_case {
                Some(open) if open.suite == caps[1] && open.name == caps[2] => {
                    open.message = Some(caps[3].to_string());
                }
                _ => {
                    self.open_case = Some(OpenCase {
                        suite: caps[1].to_string(),
                        name: caps[2].to_string(),
                        message: Some(caps[3].to_string()),
                    });
                }
            }
        } else if let Some(caps) = self.grammar.case_started.captures(line) {
            self.abandon_open_case();
            self.open_case = Some(OpenCase {
                suite: caps[1].to_string(),
                name: caps[2].to_string(),
                message: None,
            });
        } else if let Some(caps) = self.grammar.suite_started.captures(line) {
            self.finish_current_suite();
            let idx = self.suite_index(&caps[1]);
            self.current_suite = Some(idx);
        } else if self.grammar.suite_finished.captures(line).is_some() {
            self.abandon_open_case();
            self.finish_current_suite();
        }
        // Anything else is build noise between test lines; ignore it.
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;
        self.abandon_open_case();
        self.finish_current_suite();
        let report = &self.report;
        Self::notify(&mut self.formatters, |f| f.report_finished(report));
    }
}
