//! Host bridge: the async entry point a host event loop calls to run scripts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use crate::engine::{Engine, RunReport, ScriptEvaluator};
use crate::error::BridgeError;
use crate::streams::ScriptStreams;

struct BridgeState<E: ScriptEvaluator> {
    engine: Engine<E>,
    namespace: E::Namespace,
}

struct Inner<E: ScriptEvaluator> {
    state: Mutex<BridgeState<E>>,
    streams: ScriptStreams,
    /// Set while a run (or reset) holds the session.  Halting and releasing
    /// both happen under this lock, so a halt never outlives its run.
    in_flight: Mutex<bool>,
}

/// Cloneable handle owning one engine and its session namespace.
pub struct HostBridge<E: ScriptEvaluator> {
    inner: Arc<Inner<E>>,
}

impl<E: ScriptEvaluator> Clone for HostBridge<E> {
    fn clone(&self) -> Self {
        HostBridge {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock_flag(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the single-flight slot when dropped, discarding any halt that
/// arrived after the run finished.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<bool>,
    streams: &'a ScriptStreams,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut running = lock_flag(self.in_flight);
        self.streams.clear_halt();
        *running = false;
    }
}

impl<E: ScriptEvaluator> HostBridge<E> {
    /// Take ownership of `engine` and create the session namespace.
    pub fn new(engine: Engine<E>) -> Self {
        let namespace = engine.new_namespace();
        let streams = engine.streams().clone();
        HostBridge {
            inner: Arc::new(Inner {
                state: Mutex::new(BridgeState { engine, namespace }),
                streams,
                in_flight: Mutex::new(false),
            }),
        }
    }

    pub fn streams(&self) -> &ScriptStreams {
        &self.inner.streams
    }

    pub fn is_running(&self) -> bool {
        *lock_flag(&self.inner.in_flight)
    }

    fn acquire(&self) -> Result<FlightGuard<'_>, BridgeError> {
        let mut running = lock_flag(&self.inner.in_flight);
        if *running {
            return Err(BridgeError::Busy);
        }
        *running = true;
        Ok(FlightGuard {
            in_flight: &self.inner.in_flight,
            streams: &self.inner.streams,
        })
    }

    /// Run `script` on a blocking worker and return its report.
    ///
    /// Fails with [`BridgeError::Busy`] while another run is in flight.
    pub async fn run(&self, script: impl Into<String>) -> Result<RunReport, BridgeError> {
        let _flight = self.acquire()?;

        let inner = Arc::clone(&self.inner);
        let script = script.into();
        let task = tokio::task::spawn_blocking(move || {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            let BridgeState { engine, namespace } = &mut *state;
            engine.run(&script, namespace)
        });

        match task.await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, "script worker failed");
                // Whatever the script printed before the panic is discarded.
                self.inner.streams.output().drain();
                Err(BridgeError::Panicked)
            }
        }
    }

    /// Stop the current run.  Does nothing when idle.
    pub fn halt(&self) {
        let running = lock_flag(&self.inner.in_flight);
        if !*running {
            return;
        }
        debug!("halt requested");
        self.inner.streams.request_halt();
    }

    /// Replace the session namespace with a fresh one.
    pub fn reset(&self) -> Result<(), BridgeError> {
        let _flight = self.acquire()?;
        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.namespace = state.engine.new_namespace();
        debug!("session reset");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::OutputCapture;
    use crate::display::{MemorySurface, SurfaceEvent};
    use crate::engine::RunStatus;
    use crate::input::{InputBridge, InputPolicy};
    use crate::script::Interpreter;

    fn bridge_with_surface() -> (
        HostBridge<Interpreter>,
        Arc<MemorySurface>,
        tokio::sync::mpsc::UnboundedReceiver<SurfaceEvent>,
    ) {
        let (surface, events) = MemorySurface::new();
        let streams = ScriptStreams::new(
            OutputCapture::with_surface(surface.clone()),
            InputBridge::with_surface(surface.clone(), InputPolicy::Fail),
        );
        let bridge = HostBridge::new(Engine::new(Interpreter::new(), streams));
        (bridge, surface, events)
    }

    async fn next_affordance(
        events: &mut tokio::sync::mpsc::UnboundedReceiver<SurfaceEvent>,
    ) -> crate::display::InputAffordance {
        loop {
            match events.recv().await {
                Some(SurfaceEvent::InputRequested { affordance, .. }) => return affordance,
                Some(SurfaceEvent::Output(_)) => continue,
                None => panic!("surface closed"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn input_round_trip() {
        let (bridge, surface, mut events) = bridge_with_surface();
        let run = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .run("name = input('name? ')\nprint('Hello, ' + name)")
                    .await
            })
        };
        let affordance = next_affordance(&mut events).await;
        assert!(surface.submit(affordance.submit, "Ada"));
        let report = run.await.unwrap().unwrap();
        assert!(report.is_success());
        assert_eq!(report.output, "Hello, Ada\n");
        assert_eq!(surface.outputs(), vec!["Hello, Ada\n"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_run_is_busy() {
        let (bridge, surface, mut events) = bridge_with_surface();
        let run = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.run("input()").await })
        };
        let affordance = next_affordance(&mut events).await;
        assert!(bridge.is_running());
        assert!(matches!(bridge.run("pass").await, Err(BridgeError::Busy)));
        assert!(matches!(bridge.reset(), Err(BridgeError::Busy)));
        surface.submit(affordance.submit, "");
        assert!(run.await.unwrap().unwrap().is_success());
        assert!(!bridge.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn halt_during_input() {
        let (bridge, _surface, mut events) = bridge_with_surface();
        let run = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.run("print('a')\ninput()\nprint('b')").await })
        };
        next_affordance(&mut events).await;
        bridge.halt();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.status, RunStatus::Halted);
        assert_eq!(report.output, "a\n");
        assert_eq!(report.status_line(), "Program halted by user\n\n");

        // The next run is unaffected.
        let report = bridge.run("print('again')").await.unwrap();
        assert!(report.is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn halt_when_idle_is_a_no_op() {
        let (bridge, _surface, _events) = bridge_with_surface();
        bridge.halt();
        let report = bridge.run("print(1)").await.unwrap();
        assert!(report.is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unbounded_recursion_is_a_report() {
        let bridge = HostBridge::new(Engine::headless(Interpreter::new()));
        let report = bridge
            .run("def f(n):\n    return f(n + 1)\nf(0)")
            .await
            .unwrap();
        let line = report.status_line();
        assert!(
            line.contains("RecursionError: maximum recursion depth exceeded"),
            "{line}"
        );
        assert!(bridge.run("print('alive')").await.unwrap().is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn late_halt_does_not_leak_into_next_run() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let bridge = HostBridge::new(Engine::headless(Interpreter::new()));
        for _ in 0..200 {
            let stop = Arc::new(AtomicBool::new(false));
            let spammer = {
                let bridge = bridge.clone();
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        bridge.halt();
                    }
                })
            };
            // This run may or may not be halted.
            bridge.run("pass").await.unwrap();
            stop.store(true, Ordering::SeqCst);
            spammer.join().unwrap();

            let report = bridge.run("print(1)").await.unwrap();
            assert_eq!(report.status, RunStatus::Completed);
            assert_eq!(report.output, "1\n");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_clears_namespace() {
        let (bridge, _surface, _events) = bridge_with_surface();
        bridge.run("x = 1").await.unwrap();
        assert_eq!(bridge.run("print(x)").await.unwrap().output, "1\n");
        bridge.reset().unwrap();
        let report = bridge.run("print(x)").await.unwrap();
        assert!(report.status_line().contains("NameError: name 'x' is not defined"));
    }
}
