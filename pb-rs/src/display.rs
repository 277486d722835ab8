//! The display surface contract and an in-memory implementation.
//!
//! A display surface is whatever the host renders into: a web page, a
//! terminal, a test harness.  The core only ever asks it to append an output
//! element, to render an input affordance (a text field plus a submit
//! control), and to wait for that affordance's submit event.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::DisplayError;

/// Identifier of one element on a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The text field and submit control rendered for one input request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAffordance {
    pub field: ElementId,
    pub submit: ElementId,
}

/// Where captured output and input requests are rendered.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Append one output element containing exactly `text`.
    fn create_output_element(&self, text: &str) -> Result<(), DisplayError>;

    /// Render a labelled text field and its submit control.
    fn create_input_affordance(&self, prompt: &str) -> Result<InputAffordance, DisplayError>;

    /// Resolve with the field's text once `submit` fires.
    async fn await_submission(&self, submit: ElementId) -> Result<String, DisplayError>;

    /// Remove or disable an affordance after its request resolved.
    fn retire_affordance(&self, _affordance: InputAffordance) {}
}

// ── MemorySurface ─────────────────────────────────────────────────────────────

/// Notifications emitted by [`MemorySurface`] as elements are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Output(String),
    InputRequested {
        affordance: InputAffordance,
        prompt: String,
    },
}

#[derive(Default)]
struct SurfaceState {
    outputs: Vec<String>,
    /// Submit senders, keyed by submit element.
    senders: HashMap<ElementId, oneshot::Sender<String>>,
    /// Matching receivers, taken by `await_submission`.
    receivers: HashMap<ElementId, oneshot::Receiver<String>>,
}

/// A display surface that keeps its elements in memory.
///
/// Every element created is also announced on the event channel returned by
/// [`MemorySurface::new`], so a host can react to input requests by calling
/// [`MemorySurface::submit`].
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
    events: mpsc::UnboundedSender<SurfaceEvent>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl MemorySurface {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let surface = MemorySurface {
            state: Mutex::new(SurfaceState::default()),
            events: tx,
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        };
        (Arc::new(surface), rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self) -> ElementId {
        ElementId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn emit(&self, event: SurfaceEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Fire the submit event of an affordance.  Returns `false` when no
    /// request is waiting on `submit`.
    pub fn submit(&self, submit: ElementId, text: impl Into<String>) -> bool {
        match self.lock().senders.remove(&submit) {
            Some(tx) => tx.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Simulate the surface being unmounted (`false`) or restored.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Text of every output element, in creation order.
    pub fn outputs(&self) -> Vec<String> {
        self.lock().outputs.clone()
    }

    /// Number of affordances still rendered.
    pub fn live_affordances(&self) -> usize {
        self.lock().senders.len()
    }
}

#[async_trait]
impl DisplaySurface for MemorySurface {
    fn create_output_element(&self, text: &str) -> Result<(), DisplayError> {
        if !self.is_available() {
            return Err(DisplayError::Unavailable);
        }
        self.lock().outputs.push(text.to_owned());
        self.emit(SurfaceEvent::Output(text.to_owned()));
        Ok(())
    }

    fn create_input_affordance(&self, prompt: &str) -> Result<InputAffordance, DisplayError> {
        if !self.is_available() {
            return Err(DisplayError::Unavailable);
        }
        let affordance = InputAffordance {
            field: self.allocate(),
            submit: self.allocate(),
        };
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            state.senders.insert(affordance.submit, tx);
            state.receivers.insert(affordance.submit, rx);
        }
        self.emit(SurfaceEvent::InputRequested {
            affordance,
            prompt: prompt.to_owned(),
        });
        Ok(affordance)
    }

    async fn await_submission(&self, submit: ElementId) -> Result<String, DisplayError> {
        let rx = self
            .lock()
            .receivers
            .remove(&submit)
            .ok_or(DisplayError::UnknownElement(submit.0))?;
        rx.await.map_err(|_| DisplayError::Closed)
    }

    fn retire_affordance(&self, affordance: InputAffordance) {
        let mut state = self.lock();
        state.senders.remove(&affordance.submit);
        state.receivers.remove(&affordance.submit);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_elements_are_recorded_and_announced() {
        let (surface, mut events) = MemorySurface::new();
        surface.create_output_element("a").unwrap();
        surface.create_output_element("b\n").unwrap();
        assert_eq!(surface.outputs(), vec!["a", "b\n"]);
        assert_eq!(events.try_recv().unwrap(), SurfaceEvent::Output("a".into()));
        assert_eq!(events.try_recv().unwrap(), SurfaceEvent::Output("b\n".into()));
    }

    #[test]
    fn unavailable_surface_rejects_elements() {
        let (surface, _events) = MemorySurface::new();
        surface.set_available(false);
        assert!(matches!(
            surface.create_output_element("x"),
            Err(DisplayError::Unavailable)
        ));
        assert!(surface.create_input_affordance("?").is_err());
        assert!(surface.outputs().is_empty());
    }

    #[tokio::test]
    async fn submission_resolves_the_waiter() {
        let (surface, mut events) = MemorySurface::new();
        let affordance = surface.create_input_affordance("name? ").unwrap();
        match events.recv().await {
            Some(SurfaceEvent::InputRequested { prompt, .. }) => assert_eq!(prompt, "name? "),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(surface.submit(affordance.submit, "Ada"));
        let text = surface.await_submission(affordance.submit).await.unwrap();
        assert_eq!(text, "Ada");
        // The submit control fires once.
        assert!(!surface.submit(affordance.submit, "again"));
    }

    #[tokio::test]
    async fn retired_affordance_closes_the_waiter() {
        let (surface, _events) = MemorySurface::new();
        let affordance = surface.create_input_affordance("").unwrap();
        let waiter = {
            let surface = Arc::clone(&surface);
            tokio::spawn(async move { surface.await_submission(affordance.submit).await })
        };
        tokio::task::yield_now().await;
        surface.retire_affordance(affordance);
        let result = waiter.await.unwrap();
        assert!(matches!(
            result,
            Err(DisplayError::Closed) | Err(DisplayError::UnknownElement(_))
        ));
        assert_eq!(surface.live_affordances(), 0);
    }

    #[tokio::test]
    async fn unknown_submit_element() {
        let (surface, _events) = MemorySurface::new();
        assert!(matches!(
            surface.await_submission(ElementId(99)).await,
            Err(DisplayError::UnknownElement(99))
        ));
    }
}
