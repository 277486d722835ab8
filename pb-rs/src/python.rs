//! Optional CPython evaluator via the `pyo3` crate.
//!
//! Enabled with the `python` Cargo feature:
//! ```text
//! cargo build --features python
//! cargo test  --features python
//! ```
//!
//! Each session namespace is a fresh `__main__`-style dict.  During a run
//! `sys.stdout` and `sys.stderr` write into the output capture, and
//! `builtins.input` parks on the input bridge with the GIL released.
//!
//! Halting is cooperative: a halted script is stopped the next time it
//! writes output or asks for input, by raising `KeyboardInterrupt`.

#[cfg(feature = "python")]
pub use python_impl::{PythonEvaluator, PythonNamespace};

#[cfg(feature = "python")]
mod python_impl {
    use std::sync::OnceLock;

    use pyo3::exceptions::{PyEOFError, PyKeyboardInterrupt, PyRuntimeError, PySystemExit};
    use pyo3::prelude::*;
    use pyo3::types::{PyDict, PyList};
    use tracing::debug;

    use crate::engine::{ExecutionContext, Interrupt, ScriptEvaluator};
    use crate::error::InputError;
    use crate::streams::ScriptStreams;

    static PYTHON_INIT: OnceLock<()> = OnceLock::new();

    fn ensure_python() {
        // The CPython interpreter is initialised at most once per process.
        PYTHON_INIT.get_or_init(pyo3::prepare_freethreaded_python);
    }

    // ── sys.stdout / sys.stderr ───────────────────────────────────────────

    /// File-like object that forwards writes to the output capture.
    #[pyclass]
    struct CaptureStream {
        streams: ScriptStreams,
    }

    #[pymethods]
    impl CaptureStream {
        fn write(&self, text: &str) -> PyResult<usize> {
            if self.streams.is_halted() {
                return Err(PyKeyboardInterrupt::new_err(()));
            }
            if !text.is_empty() {
                self.streams.write(text);
            }
            Ok(text.chars().count())
        }

        fn flush(&self) {}

        fn isatty(&self) -> bool {
            false
        }
    }

    // ── builtins.input ────────────────────────────────────────────────────

    /// Replacement for `input()` that waits on the input bridge.
    #[pyclass]
    struct BridgedInput {
        streams: ScriptStreams,
    }

    #[pymethods]
    impl BridgedInput {
        #[pyo3(signature = (prompt = None))]
        fn __call__(&self, py: Python<'_>, prompt: Option<Bound<'_, PyAny>>) -> PyResult<String> {
            let prompt = match prompt {
                Some(p) => p.str()?.to_string(),
                None => String::new(),
            };
            let streams = self.streams.clone();
            let result = py.allow_threads(move || streams.read_line(&prompt));
            result.map_err(|e| match e {
                InputError::Cancelled => PyKeyboardInterrupt::new_err(()),
                InputError::AlreadyPending => PyRuntimeError::new_err(e.to_string()),
                InputError::Stalled(_) => PyEOFError::new_err(e.to_string()),
                InputError::NoSurface | InputError::Display(_) => {
                    PyEOFError::new_err("EOF when reading a line")
                }
            })
        }
    }

    // ── PythonEvaluator ───────────────────────────────────────────────────

    /// Global namespace of a Python session.
    pub struct PythonNamespace {
        globals: Py<PyDict>,
    }

    impl PythonNamespace {
        /// Read a global as a Python `repr` string.
        pub fn repr_of(&self, name: &str) -> Option<String> {
            Python::with_gil(|py| {
                let value = self.globals.bind(py).get_item(name).ok()??;
                value.repr().ok().map(|r| r.to_string())
            })
        }
    }

    /// Runs scripts with the embedded CPython interpreter.
    #[derive(Debug, Default)]
    pub struct PythonEvaluator;

    impl PythonEvaluator {
        pub fn new() -> Self {
            ensure_python();
            PythonEvaluator
        }

        fn install_streams(py: Python<'_>, streams: &ScriptStreams) -> PyResult<()> {
            let sys = py.import_bound("sys")?;
            let out = Py::new(py, CaptureStream { streams: streams.clone() })?;
            sys.setattr("stdout", out.clone_ref(py))?;
            sys.setattr("stderr", out)?;
            let input = Py::new(py, BridgedInput { streams: streams.clone() })?;
            py.import_bound("builtins")?.setattr("input", input)?;
            Ok(())
        }

        /// Classify an exception that escaped the script.
        fn interrupt(py: Python<'_>, err: PyErr, streams: &ScriptStreams) -> Interrupt {
            if err.is_instance_of::<PySystemExit>(py) {
                let code = err
                    .value_bound(py)
                    .getattr("code")
                    .unwrap_or_else(|_| py.None().into_bound(py));
                if code.is_none() {
                    return Interrupt::Exit(0);
                }
                if let Ok(n) = code.extract::<i64>() {
                    return Interrupt::Exit(n);
                }
                let text = code.str().map(|s| s.to_string()).unwrap_or_default();
                streams.write(&format!("{text}\n"));
                return Interrupt::Exit(1);
            }
            if err.is_instance_of::<PyKeyboardInterrupt>(py) && streams.is_halted() {
                return Interrupt::Halted;
            }
            Interrupt::Fault(format_exception(py, &err))
        }
    }

    /// `traceback.format_exception` text without the final newline.
    fn format_exception(py: Python<'_>, err: &PyErr) -> String {
        let formatted = (|| -> PyResult<String> {
            let lines = py.import_bound("traceback")?.call_method1(
                "format_exception",
                (
                    err.get_type_bound(py),
                    err.value_bound(py),
                    err.traceback_bound(py),
                ),
            )?;
            let lines = lines.downcast::<PyList>()?;
            let mut text = String::new();
            for line in lines.iter() {
                text.push_str(&line.extract::<String>()?);
            }
            Ok(text)
        })();
        match formatted {
            Ok(text) => text.trim_end_matches('\n').to_owned(),
            Err(_) => err.to_string(),
        }
    }

    impl ScriptEvaluator for PythonEvaluator {
        type Namespace = PythonNamespace;

        fn name(&self) -> &'static str {
            "python"
        }

        fn new_namespace(&self) -> PythonNamespace {
            ensure_python();
            Python::with_gil(|py| {
                let globals = PyDict::new_bound(py);
                if let Ok(builtins) = py.import_bound("builtins") {
                    let _ = globals.set_item("__builtins__", builtins);
                }
                let _ = globals.set_item("__name__", "__main__");
                PythonNamespace {
                    globals: globals.unbind(),
                }
            })
        }

        fn evaluate(
            &mut self,
            script: &str,
            ctx: &mut ExecutionContext<'_, PythonNamespace>,
        ) -> Result<(), Interrupt> {
            let streams = ctx.streams;
            Python::with_gil(|py| {
                Self::install_streams(py, streams)
                    .map_err(|e| Interrupt::Fault(format_exception(py, &e)))?;
                let globals = ctx.namespace.globals.bind(py);
                debug!("executing python script");
                py.run_bound(script, Some(globals), None)
                    .map_err(|e| Self::interrupt(py, e, streams))
            })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "python"))]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::capture::OutputCapture;
    use crate::engine::{Engine, RunStatus};
    use crate::input::{InputBridge, InputPolicy};
    use crate::streams::ScriptStreams;

    // The interpreter's sys module is process-wide; run tests one at a time.
    static TEST_MX: Mutex<()> = Mutex::new(());

    fn engine(policy: InputPolicy) -> Engine<PythonEvaluator> {
        let streams = ScriptStreams::new(OutputCapture::new(), InputBridge::new(policy));
        Engine::new(PythonEvaluator::new(), streams)
    }

    #[test]
    fn print_is_captured() {
        let _g = TEST_MX.lock().unwrap_or_else(|p| p.into_inner());
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("print('hi')", &mut ns);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.output, "hi\n");
    }

    #[test]
    fn namespace_persists() {
        let _g = TEST_MX.lock().unwrap_or_else(|p| p.into_inner());
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        eng.run("x = 41", &mut ns);
        assert_eq!(eng.run("print(x + 1)", &mut ns).output, "42\n");
        assert_eq!(ns.repr_of("x").as_deref(), Some("41"));
    }

    #[test]
    fn system_exit_codes() {
        let _g = TEST_MX.lock().unwrap_or_else(|p| p.into_inner());
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        assert_eq!(eng.run("import sys\nsys.exit(3)", &mut ns).status, RunStatus::Exited(3));
        assert_eq!(eng.run("import sys\nsys.exit()", &mut ns).status, RunStatus::Exited(0));
        let report = eng.run("import sys\nsys.exit('bye')", &mut ns);
        assert_eq!(report.status, RunStatus::Exited(1));
        assert_eq!(report.output, "bye\n");
    }

    #[test]
    fn exception_trace() {
        let _g = TEST_MX.lock().unwrap_or_else(|p| p.into_inner());
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("1/0", &mut ns);
        match report.status {
            RunStatus::Faulted(trace) => {
                assert!(trace.starts_with("Traceback (most recent call last):"));
                assert!(trace.ends_with("ZeroDivisionError: division by zero"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn canned_input() {
        let _g = TEST_MX.lock().unwrap_or_else(|p| p.into_inner());
        let mut eng = engine(InputPolicy::Canned("Custom input response".into()));
        let mut ns = eng.new_namespace();
        let report = eng.run("print(input('? '))", &mut ns);
        assert_eq!(report.output, "Custom input response\n");
    }

    #[test]
    fn input_without_surface_is_eof() {
        let _g = TEST_MX.lock().unwrap_or_else(|p| p.into_inner());
        let mut eng = engine(InputPolicy::Fail);
        let mut ns = eng.new_namespace();
        let report = eng.run("input()", &mut ns);
        assert!(report.status_line().contains("EOFError: EOF when reading a line"));
    }
}
