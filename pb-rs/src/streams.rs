//! The I/O services handed to an evaluator for one session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::capture::OutputCapture;
use crate::error::InputError;
use crate::input::InputBridge;

/// Output capture, input bridge and halt flag, bundled for evaluators.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ScriptStreams {
    output: OutputCapture,
    input: InputBridge,
    halt: Arc<AtomicBool>,
}

impl ScriptStreams {
    pub fn new(output: OutputCapture, input: InputBridge) -> Self {
        ScriptStreams {
            output,
            input,
            halt: Arc::default(),
        }
    }

    pub fn output(&self) -> &OutputCapture {
        &self.output
    }

    pub fn input(&self) -> &InputBridge {
        &self.input
    }

    /// Script `print`.
    pub fn write(&self, text: &str) {
        self.output.write(text);
    }

    /// Script `input`: block the calling thread until a line is submitted.
    ///
    /// Must not be called from an async worker thread when a surface is
    /// attached; the engine runs scripts on a blocking thread for this.
    pub fn read_line(&self, prompt: &str) -> Result<String, InputError> {
        if self.is_halted() {
            return Err(InputError::Cancelled);
        }
        if !self.input.has_surface() {
            return self.input.fallback();
        }
        match Handle::try_current() {
            Ok(handle) => handle.block_on(self.input.read_line(prompt)),
            Err(_) => {
                warn!("input requested outside a tokio runtime; using fallback");
                self.input.fallback()
            }
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    /// Ask the running script to stop at its next safe point.
    pub fn request_halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
        self.input.cancel();
    }

    pub fn clear_halt(&self) {
        self.halt.store(false, Ordering::SeqCst);
        self.input.reset_cancel();
    }
}
