//! Scripted tool invoker for tests.
//!
//! Plays back queued results in invocation order and records every
//! invocation it receives, so tests can assert on exact command lines
//! without spawning processes.

use std::sync::Mutex;

use crate::invoke::{InvokeError, InvokeResult, Invocation, LineSink, ToolInvoker};

/// One scripted response.
#[derive(Debug, Clone)]
struct Script {
    /// Expected program name; recorded mismatches surface through
    /// [`ScriptedInvoker::calls`] assertions in tests.
    program: String,
    lines: Vec<String>,
    exit_code: i32,
}

#[derive(Debug, Default)]
struct State {
    scripts: Vec<Script>,
    next: usize,
    calls: Vec<Invocation>,
}

/// Invoker that replays a queue of scripted runs.
///
/// When the queue is exhausted, further invocations succeed silently
/// with no output; they are still recorded.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    state: Mutex<State>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful run with no output.
    pub fn expect_success(&self, program: &str) {
        self.push(program, Vec::new(), 0);
    }

    /// Queue a successful run emitting the given output lines.
    pub fn expect_success_with_output(&self, program: &str, lines: Vec<String>) {
        self.push(program, lines, 0);
    }

    /// Queue a failing run with the given exit code.
    pub fn expect_failure(&self, program: &str, exit_code: i32) {
        self.push(program, Vec::new(), exit_code);
    }

    /// Queue a failing run that still emits output first, the way a
    /// real tool reports diagnostics before dying.
    pub fn expect_failure_with_output(&self, program: &str, lines: Vec<String>, exit_code: i32) {
        self.push(program, lines, exit_code);
    }

    fn push(&self, program: &str, lines: Vec<String>, exit_code: i32) {
        self.state.lock().unwrap().scripts.push(Script {
            program: program.to_string(),
            lines,
            exit_code,
        });
    }

    /// Every invocation received, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Invocations of the given program, in order.
    pub fn calls_of(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

impl ToolInvoker for ScriptedInvoker {
    fn run(&self, invocation: &Invocation, on_line: LineSink<'_>) -> InvokeResult<()> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(invocation.clone());
            let script = state.scripts.get(state.next).cloned();
            if script.is_some() {
                state.next += 1;
            }
            script
        };

        let Some(script) = script else {
            return Ok(());
        };

        // Lines are delivered even on failing runs, matching the real
        // invoker's contract.
        for line in &script.lines {
            on_line(line);
        }

        if script.exit_code == 0 {
            Ok(())
        } else {
            Err(InvokeError::ExitStatus {
                program: script.program,
                code: script.exit_code,
            })
        }
    }
}
