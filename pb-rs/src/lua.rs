//! Optional Lua 5.4 evaluator via the `mlua` crate.
//!
//! Enabled with the `lua` Cargo feature:
//! ```text
//! cargo build --features lua
//! cargo test  --features lua
//! ```
//!
//! Each session namespace is its own Lua state.  Before every run the I/O
//! globals are rebound to the session's streams:
//!
//! | Lua function           | Effect                                       |
//! |------------------------|----------------------------------------------|
//! | `print(...)`           | tab-separated, newline-terminated output     |
//! | `io.write(...)`        | raw output                                   |
//! | `io.read()`            | one line from the input bridge, `nil` on EOF |
//! | `input([prompt])`      | like `io.read` with a prompt label           |
//! | `os.exit([code])`      | stop the run with an exit code               |
//!
//! An instruction-count hook stops halted scripts even in tight loops.

#[cfg(feature = "lua")]
pub use lua_impl::{LuaEvaluator, LuaNamespace};

#[cfg(feature = "lua")]
mod lua_impl {
    use std::fmt;

    use mlua::prelude::*;
    use mlua::{HookTriggers, Variadic, VmState};
    use tracing::debug;

    use crate::engine::{ExecutionContext, Interrupt, ScriptEvaluator};
    use crate::error::InputError;
    use crate::streams::ScriptStreams;

    /// Instructions between halt checks.
    const HALT_CHECK_INTERVAL: u32 = 1000;

    /// Raised by `os.exit` to unwind the script.
    #[derive(Debug)]
    struct ExitRequest(i64);

    impl fmt::Display for ExitRequest {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "exit({})", self.0)
        }
    }

    impl std::error::Error for ExitRequest {}

    /// Raised when the host halted the run.
    #[derive(Debug)]
    struct HaltRequest;

    impl fmt::Display for HaltRequest {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("halted")
        }
    }

    impl std::error::Error for HaltRequest {}

    /// Find an external error of type `T` anywhere in a callback chain.
    fn find_external<T: std::error::Error + 'static>(err: &LuaError) -> Option<&T> {
        match err {
            LuaError::ExternalError(e) => e.downcast_ref::<T>(),
            LuaError::CallbackError { cause, .. } => find_external(cause),
            LuaError::WithContext { cause, .. } => find_external(cause),
            _ => None,
        }
    }

    // ── LuaEvaluator ──────────────────────────────────────────────────────

    /// Global state of a Lua session.
    pub struct LuaNamespace {
        lua: Lua,
    }

    impl LuaNamespace {
        /// Read a global converted to a string, if it is a string or number.
        pub fn global_string(&self, name: &str) -> Option<String> {
            self.lua.globals().get::<Option<String>>(name).ok().flatten()
        }
    }

    /// Runs scripts in a Lua 5.4 state.
    #[derive(Debug, Default)]
    pub struct LuaEvaluator;

    impl LuaEvaluator {
        pub fn new() -> Self {
            LuaEvaluator
        }

        fn bind_streams(lua: &Lua, streams: &ScriptStreams) -> LuaResult<()> {
            let globals = lua.globals();

            // print(...)
            {
                let streams = streams.clone();
                globals.set(
                    "print",
                    lua.create_function(move |lua, args: Variadic<LuaValue>| {
                        let tostring: LuaFunction = lua.globals().get("tostring")?;
                        let mut parts = Vec::with_capacity(args.len());
                        for v in args {
                            parts.push(tostring.call::<String>(v)?);
                        }
                        let mut line = parts.join("\t");
                        line.push('\n');
                        streams.write(&line);
                        Ok(())
                    })?,
                )?;
            }

            let io: LuaTable = globals.get("io")?;

            // io.write(...)
            {
                let streams = streams.clone();
                io.set(
                    "write",
                    lua.create_function(move |_, args: Variadic<LuaValue>| {
                        let mut text = String::new();
                        for v in args {
                            match v {
                                LuaValue::String(s) => text.push_str(&s.to_str()?),
                                LuaValue::Integer(i) => text.push_str(&i.to_string()),
                                LuaValue::Number(n) => text.push_str(&n.to_string()),
                                other => {
                                    return Err(LuaError::RuntimeError(format!(
                                        "bad argument to 'write' (string expected, got {})",
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                        if !text.is_empty() {
                            streams.write(&text);
                        }
                        Ok(())
                    })?,
                )?;
            }

            // io.read() and input([prompt])
            let reader = |streams: ScriptStreams| {
                move |_: &Lua, prompt: Option<String>| -> LuaResult<Option<String>> {
                    match streams.read_line(prompt.as_deref().unwrap_or("")) {
                        Ok(line) => Ok(Some(line)),
                        Err(InputError::Cancelled) => Err(LuaError::external(HaltRequest)),
                        Err(InputError::AlreadyPending) => {
                            Err(LuaError::RuntimeError(InputError::AlreadyPending.to_string()))
                        }
                        Err(InputError::Stalled(d)) => Err(LuaError::RuntimeError(
                            InputError::Stalled(d).to_string(),
                        )),
                        Err(InputError::NoSurface | InputError::Display(_)) => Ok(None),
                    }
                }
            };
            {
                let read = reader(streams.clone());
                io.set(
                    "read",
                    lua.create_function(move |lua, _fmt: Option<LuaValue>| read(lua, None))?,
                )?;
            }
            globals.set("input", lua.create_function(reader(streams.clone()))?)?;

            // os.exit([code])
            let os: LuaTable = globals.get("os")?;
            os.set(
                "exit",
                lua.create_function(|_, code: Option<LuaValue>| -> LuaResult<()> {
                    let code = match code {
                        None | Some(LuaValue::Nil) | Some(LuaValue::Boolean(true)) => 0,
                        Some(LuaValue::Boolean(false)) => 1,
                        Some(LuaValue::Integer(n)) => n,
                        Some(LuaValue::Number(n)) => n as i64,
                        Some(other) => {
                            return Err(LuaError::RuntimeError(format!(
                                "bad argument #1 to 'exit' (number expected, got {})",
                                other.type_name()
                            )))
                        }
                    };
                    Err(LuaError::external(ExitRequest(code)))
                })?,
            )?;

            // Halt check.
            let streams = streams.clone();
            let _ = lua.set_hook(
                HookTriggers::new().every_nth_instruction(HALT_CHECK_INTERVAL),
                move |_, _| {
                    if streams.is_halted() {
                        Err(LuaError::external(HaltRequest))
                    } else {
                        Ok(VmState::Continue)
                    }
                },
            );

            Ok(())
        }
    }

    impl ScriptEvaluator for LuaEvaluator {
        type Namespace = LuaNamespace;

        fn name(&self) -> &'static str {
            "lua"
        }

        fn new_namespace(&self) -> LuaNamespace {
            LuaNamespace { lua: Lua::new() }
        }

        fn evaluate(
            &mut self,
            script: &str,
            ctx: &mut ExecutionContext<'_, LuaNamespace>,
        ) -> Result<(), Interrupt> {
            let lua = &ctx.namespace.lua;
            Self::bind_streams(lua, ctx.streams).map_err(|e| Interrupt::Fault(e.to_string()))?;
            debug!("executing lua chunk");
            lua.load(script)
                .set_name("=script")
                .exec()
                .map_err(|e| {
                    if let Some(ExitRequest(code)) = find_external::<ExitRequest>(&e) {
                        Interrupt::Exit(*code)
                    } else if find_external::<HaltRequest>(&e).is_some() {
                        Interrupt::Halted
                    } else {
                        Interrupt::Fault(e.to_string())
                    }
                })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "lua"))]
mod tests {
    use super::*;
    use crate::capture::OutputCapture;
    use crate::engine::{Engine, RunStatus};
    use crate::input::{InputBridge, InputPolicy};
    use crate::streams::ScriptStreams;

    fn engine(policy: InputPolicy) -> Engine<LuaEvaluator> {
        let streams = ScriptStreams::new(OutputCapture::new(), InputBridge::new(policy));
        Engine::new(LuaEvaluator::new(), streams)
    }

    #[test]
    fn print_joins_with_tabs() {
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("print('a', 1, true, nil)", &mut ns);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.output, "a\t1\ttrue\tnil\n");
    }

    #[test]
    fn io_write_is_raw() {
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("io.write('x', 2)\nio.write('\\n')", &mut ns);
        assert_eq!(report.output, "x2\n");
    }

    #[test]
    fn globals_persist() {
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        eng.run("counter = 10", &mut ns);
        assert_eq!(eng.run("print(counter + 1)", &mut ns).output, "11\n");
        assert_eq!(ns.global_string("counter").as_deref(), Some("10"));
    }

    #[test]
    fn os_exit_code() {
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("print('before')\nos.exit(5)\nprint('after')", &mut ns);
        assert_eq!(report.status, RunStatus::Exited(5));
        assert_eq!(report.output, "before\n");
    }

    #[test]
    fn runtime_error_is_fault() {
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("error('boom')", &mut ns);
        match report.status {
            RunStatus::Faulted(trace) => assert!(trace.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn canned_input_and_eof() {
        let mut eng = engine(InputPolicy::Canned("Ada".into()));
        let mut ns = eng.new_namespace();
        assert_eq!(eng.run("print(input('name? '))", &mut ns).output, "Ada\n");

        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        assert_eq!(eng.run("print(io.read())", &mut ns).output, "nil\n");
    }

    #[test]
    fn halted_loop_stops() {
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        eng.streams().request_halt();
        let report = eng.run("while true do end", &mut ns);
        assert_eq!(report.status, RunStatus::Halted);
    }
}
