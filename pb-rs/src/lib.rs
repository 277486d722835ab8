//! Run user scripts whose blocking `print`/`input` are bridged to an
//! asynchronous host display.
//!
//! The pieces, in the order a run passes through them:
//!
//! * [`host::HostBridge`]: the async `run(script)` entry point, one run at a time.
//! * [`engine::Engine`]: executes a script through a [`engine::ScriptEvaluator`]
//!   and turns the outcome into a [`engine::RunReport`].
//! * [`capture::OutputCapture`]: buffers output and mirrors every write to the
//!   [`display::DisplaySurface`].
//! * [`input::InputBridge`]: renders an input affordance and parks the script
//!   until it is submitted.
//!
//! The built-in evaluator is [`script::Interpreter`]; `python` and `lua`
//! features add CPython and Lua evaluators.

pub mod capture;
pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod host;
pub mod input;
pub mod lua;
pub mod namespace;
pub mod python;
pub mod script;
pub mod streams;
pub mod terminal;

pub use engine::{Engine, RunReport, RunStatus};
pub use host::HostBridge;
