//! Execution engine: run a script against a namespace and report the outcome.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::capture::OutputCapture;
use crate::input::InputBridge;
use crate::streams::ScriptStreams;

/// How an evaluation ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// The script called its exit primitive.
    Exit(i64),
    /// An unhandled error; carries the full trace text.
    Fault(String),
    /// The host halted the run.
    Halted,
}

/// What an evaluator gets to work with during one run.
pub struct ExecutionContext<'a, N> {
    pub namespace: &'a mut N,
    pub streams: &'a ScriptStreams,
}

/// A language the engine can run.
///
/// Implementations route all output through `ctx.streams.write`, all input
/// through `ctx.streams.read_line`, and poll `ctx.streams.is_halted()` at
/// safe points.
pub trait ScriptEvaluator: Send + 'static {
    /// Per-session global state.
    type Namespace: Send + 'static;

    /// Short identifier (`builtin`, `python`, `lua`).
    fn name(&self) -> &'static str;

    fn new_namespace(&self) -> Self::Namespace;

    fn evaluate(
        &mut self,
        script: &str,
        ctx: &mut ExecutionContext<'_, Self::Namespace>,
    ) -> Result<(), Interrupt>;
}

// ── RunReport ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Exited(i64),
    Faulted(String),
    Halted,
}

/// The outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,
    /// Everything the script wrote during the run.
    pub output: String,
    pub elapsed: Duration,
}

impl RunReport {
    /// The human-readable status block, including its trailing blank line.
    pub fn status_line(&self) -> String {
        match &self.status {
            RunStatus::Completed => format!(
                "Program completed in {:.2} seconds\n\n",
                self.elapsed.as_secs_f64()
            ),
            RunStatus::Exited(code) => format!("Program exited with code: {code}\n\n"),
            RunStatus::Faulted(trace) => format!("Error: {trace}\n\n"),
            RunStatus::Halted => "Program halted by user\n\n".to_owned(),
        }
    }

    /// Output followed by the status line.
    pub fn transcript(&self) -> String {
        let mut s = self.output.clone();
        s.push_str(&self.status_line());
        s
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Process exit code the binary should use for this run.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed => 0,
            RunStatus::Exited(code) => i32::try_from(code & 0xff).unwrap_or(1),
            RunStatus::Faulted(_) => 1,
            RunStatus::Halted => 130,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_line())
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// An evaluator plus the I/O services it runs with.
pub struct Engine<E: ScriptEvaluator> {
    evaluator: E,
    streams: ScriptStreams,
}

impl<E: ScriptEvaluator> Engine<E> {
    pub fn new(evaluator: E, streams: ScriptStreams) -> Self {
        Engine { evaluator, streams }
    }

    /// An engine with no display surface and failing input.
    pub fn headless(evaluator: E) -> Self {
        Self::new(
            evaluator,
            ScriptStreams::new(OutputCapture::new(), InputBridge::new(Default::default())),
        )
    }

    pub fn streams(&self) -> &ScriptStreams {
        &self.streams
    }

    pub fn evaluator_name(&self) -> &'static str {
        self.evaluator.name()
    }

    pub fn new_namespace(&self) -> E::Namespace {
        self.evaluator.new_namespace()
    }

    /// Execute `script` against `namespace` and classify the outcome.
    ///
    /// Blocks until the script finishes, including while it waits for input.
    pub fn run(&mut self, script: &str, namespace: &mut E::Namespace) -> RunReport {
        debug!(evaluator = self.evaluator.name(), bytes = script.len(), "run started");
        let start = Instant::now();
        let result = {
            let mut ctx = ExecutionContext {
                namespace,
                streams: &self.streams,
            };
            self.evaluator.evaluate(script, &mut ctx)
        };
        let elapsed = start.elapsed();

        let status = match result {
            Ok(()) if self.streams.is_halted() => RunStatus::Halted,
            Ok(()) => RunStatus::Completed,
            Err(Interrupt::Exit(code)) => RunStatus::Exited(code),
            Err(Interrupt::Fault(trace)) => RunStatus::Faulted(trace),
            Err(Interrupt::Halted) => RunStatus::Halted,
        };
        self.streams.clear_halt();
        let output = self.streams.output().drain();
        debug!(?status, elapsed_ms = elapsed.as_millis() as u64, "run finished");
        RunReport {
            status,
            output,
            elapsed,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
