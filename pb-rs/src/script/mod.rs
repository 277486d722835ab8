//! The built-in script language.
//!
//! A small Python-flavoured language evaluated by a tree-walking interpreter,
//! covering:
//!
//! - `int`, `float`, `str`, `bool`, `None`, lists and `range`
//! - Arithmetic, comparison chains, `and`/`or`/`not`, conditional expressions
//! - `if`/`elif`/`else`, `while`, `for`, `break`, `continue`, `pass`, `del`
//! - `def` with defaults and keyword arguments, `return`, `global`
//! - `print`, `input`, `exit` and ~20 other built-ins; `math` and `time`
//! - Python-style tracebacks for uncaught errors
//!
//! # Quick start
//!
//! ```rust
//! use pyblocks::capture::OutputCapture;
//! use pyblocks::input::{InputBridge, InputPolicy};
//! use pyblocks::namespace::Namespace;
//! use pyblocks::script::Interpreter;
//! use pyblocks::streams::ScriptStreams;
//!
//! let io = ScriptStreams::new(OutputCapture::new(), InputBridge::new(InputPolicy::Fail));
//! let mut ns = Namespace::new();
//! Interpreter::new().exec("x = 6\nprint(x * 7)", &mut ns, &io).unwrap();
//! assert_eq!(io.output().drain(), "42\n");
//! ```

pub mod builtins;
pub mod expr;
pub mod fault;
pub mod interp;
pub mod lexer;
pub mod stmt;
pub mod value;

pub use expr::EvalContext;
pub use fault::{Fault, FaultKind, Unwind};
pub use interp::Interpreter;
pub use value::Value;
