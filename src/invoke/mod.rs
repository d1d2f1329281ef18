//! External tool invocation for shiplane.
//!
//! Every stage of the lane drives exactly one external program
//! (xcodebuild, codesign, xcrun, zip, security, scp, curl). This module
//! owns the narrow seam between the lane and those processes: an
//! [`Invocation`] describes one run, and a [`ToolInvoker`] executes it
//! with line-by-line output streaming. Tests substitute a scripted
//! invoker (see `crate::mock`).

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{program} failed to start: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with status {code}")]
    ExitStatus { program: String, code: i32 },

    #[error("{program} terminated by a signal")]
    Signalled { program: String },

    #[error("error streaming {program} output: {source}")]
    Stream {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Result type for invoker operations.
pub type InvokeResult<T> = Result<T, InvokeError>;

/// One external tool invocation: program, ordered argv, environment
/// overlay, and optional working directory.
///
/// The environment is an overlay on the inherited process environment,
/// rebuilt per call from the lane configuration; it is never persisted.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: HashMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Render the command line for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Callback receiving one output line at a time, without the trailing
/// newline.
pub type LineSink<'a> = &'a mut dyn FnMut(&str);

/// Executes external programs with streamed output.
///
/// `run` blocks until the process exits, feeding each stdout line (and
/// then any stderr lines) to `on_line` as they arrive. A non-zero exit
/// is an [`InvokeError::ExitStatus`]; lines observed before the failure
/// have already been delivered.
pub trait ToolInvoker {
    fn run(&self, invocation: &Invocation, on_line: LineSink<'_>) -> InvokeResult<()>;

    /// Run to completion and capture all output as one string.
    fn capture(&self, invocation: &Invocation) -> InvokeResult<String> {
        let mut out = String::new();
        self.run(invocation, &mut |line| {
            out.push_str(line);
            out.push('\n');
        })?;
        Ok(out)
    }
}

impl<T: ToolInvoker + ?Sized> ToolInvoker for std::sync::Arc<T> {
    fn run(&self, invocation: &Invocation, on_line: LineSink<'_>) -> InvokeResult<()> {
        (**self).run(invocation, on_line)
    }
}

/// Production invoker backed by `std::process`.
#[derive(Debug, Default)]
pub struct SystemInvoker;

impl SystemInvoker {
    pub fn new() -> Self {
        Self
    }
}

impl ToolInvoker for SystemInvoker {
    fn run(&self, invocation: &Invocation, on_line: LineSink<'_>) -> InvokeResult<()> {
        tracing::debug!(command = %invocation.command_line(), "running external tool");
        let program = invocation.program.clone();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| InvokeError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Drain stderr on a side thread so neither pipe can fill up and
        // stall the child; its lines are replayed into the sink after
        // stdout is exhausted, keeping the sink single-threaded.
        let stderr = child.stderr.take();
        let stderr_handle = std::thread::spawn(move || {
            let mut lines = Vec::new();
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    lines.push(line);
                }
            }
            lines
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.map_err(|source| InvokeError::Stream {
                    program: program.clone(),
                    source,
                })?;
                on_line(&line);
            }
        }

        if let Ok(lines) = stderr_handle.join() {
            for line in &lines {
                on_line(line);
            }
        }

        let status = child.wait().map_err(|source| InvokeError::Stream {
            program: program.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(InvokeError::ExitStatus { program, code }),
                None => Err(InvokeError::Signalled { program }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_spaced_args() {
        let inv = Invocation::new("xcodebuild")
            .arg("-sdk")
            .arg("iphoneos")
            .arg("OTHER_FLAGS=--keychain /tmp/my keychain");
        assert_eq!(
            inv.command_line(),
            "xcodebuild -sdk iphoneos \"OTHER_FLAGS=--keychain /tmp/my keychain\""
        );
    }

    #[test]
    fn invocation_builder_accumulates() {
        let inv = Invocation::new("security")
            .args(["list-keychains", "-d", "user"])
            .env("HOME", "/tmp");
        assert_eq!(inv.program, "security");
        assert_eq!(inv.args.len(), 3);
        assert_eq!(inv.env.get("HOME").map(String::as_str), Some("/tmp"));
    }
}
