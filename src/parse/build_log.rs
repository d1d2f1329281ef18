//! Build-output classification.

use std::io::{self, Write};

use super::LineParser;

/// Classification of one build-output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Normal,
    Warning,
    Error,
}

/// Terminal outcome markers emitted by the build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed,
}

/// Classified build log, usable while the build is still running.
#[derive(Debug, Default)]
pub struct BuildLog {
    pub lines: Vec<(LineKind, String)>,
    pub warnings: usize,
    pub errors: usize,
    pub outcome: Option<BuildOutcome>,
}

impl BuildLog {
    /// Write the log as a plaintext artifact: every line verbatim,
    /// followed by a classification summary block.
    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        for (_, line) in &self.lines {
            writeln!(out, "{line}")?;
        }
        writeln!(out)?;
        writeln!(out, "=== classification summary ===")?;
        writeln!(out, "errors: {}", self.errors)?;
        writeln!(out, "warnings: {}", self.warnings)?;
        let outcome = match self.outcome {
            Some(BuildOutcome::Succeeded) => "succeeded",
            Some(BuildOutcome::Failed) => "failed",
            None => "unknown",
        };
        writeln!(out, "outcome: {outcome}")?;
        Ok(())
    }
}

/// Streaming classifier for generic build-tool output.
#[derive(Debug, Default)]
pub struct BuildLogParser {
    log: BuildLog,
    flushed: bool,
}

impl BuildLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    pub fn into_log(self) -> BuildLog {
        self.log
    }

    fn classify(line: &str) -> LineKind {
        // xcodebuild/clang diagnostics carry "error:"/"warning:";
        // linker failures surface as "ld: " lines without the marker.
        if line.contains("error:") || line.contains("ld: ") || line.contains("** BUILD FAILED **")
        {
            LineKind::Error
        } else if line.contains("warning:") {
            LineKind::Warning
        } else {
            LineKind::Normal
        }
    }
}

impl LineParser for BuildLogParser {
    fn feed(&mut self, line: &str) {
        if line.contains("** BUILD SUCCEEDED **") {
            self.log.outcome = Some(BuildOutcome::Succeeded);
        } else if line.contains("** BUILD FAILED **") {
            self.log.outcome = Some(BuildOutcome::Failed);
        }

        let kind = Self::classify(line);
        match kind {
            LineKind::Error => self.log.errors += 1,
            LineKind::Warning => self.log.warnings += 1,
            LineKind::Normal => {}
        }
        self.log.lines.push((kind, line.to_string()));
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;
    }
}
