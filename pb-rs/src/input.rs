//! Input suspension bridge.
//!
//! A script's `input()` is a blocking read; the host only knows how to render
//! an affordance and wait for its submit event.  [`InputBridge::read_line`]
//! joins the two: it renders the affordance, parks on the submission and
//! hands the text back, with at most one request outstanding at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::display::{DisplaySurface, InputAffordance};
use crate::error::InputError;

/// What `read_line` does when there is no surface to ask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputPolicy {
    /// Answer every request with this text.
    Canned(String),
    /// Fail the request.
    #[default]
    Fail,
}

/// The one outstanding request.
struct Pending {
    affordance: Option<InputAffordance>,
    cancel: oneshot::Sender<()>,
}

/// Suspends input requests until the display surface submits a line.
///
/// Clones share the pending-request slot.
#[derive(Clone)]
pub struct InputBridge {
    surface: Option<Arc<dyn DisplaySurface>>,
    policy: InputPolicy,
    timeout: Option<Duration>,
    pending: Arc<Mutex<Option<Pending>>>,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for InputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBridge")
            .field("surface", &self.surface.is_some())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl InputBridge {
    /// A bridge with no surface; every request follows `policy`.
    pub fn new(policy: InputPolicy) -> Self {
        InputBridge {
            surface: None,
            policy,
            timeout: None,
            pending: Arc::default(),
            cancelled: Arc::default(),
        }
    }

    pub fn with_surface(surface: Arc<dyn DisplaySurface>, policy: InputPolicy) -> Self {
        InputBridge {
            surface: Some(surface),
            ..Self::new(policy)
        }
    }

    /// Fail requests that are not answered within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|d| !d.is_zero());
        self
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn policy(&self) -> &InputPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self) -> bool {
        self.slot().is_some()
    }

    /// Answer according to the no-surface policy.
    pub fn fallback(&self) -> Result<String, InputError> {
        match &self.policy {
            InputPolicy::Canned(text) => Ok(text.clone()),
            InputPolicy::Fail => Err(InputError::NoSurface),
        }
    }

    /// Resolve the pending request (and any request made before
    /// [`InputBridge::reset_cancel`]) with [`InputError::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(pending) = self.slot().take() {
            debug!("cancelling pending input request");
            if let Some(affordance) = pending.affordance {
                if let Some(surface) = &self.surface {
                    surface.retire_affordance(affordance);
                }
            }
            let _ = pending.cancel.send(());
        }
    }

    /// Accept requests again after a [`InputBridge::cancel`].
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Render an affordance labelled `prompt` and wait for its submission.
    ///
    /// The returned line has its trailing newline removed.
    pub async fn read_line(&self, prompt: &str) -> Result<String, InputError> {
        let Some(surface) = &self.surface else {
            return self.fallback();
        };

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        {
            let mut slot = self.slot();
            if slot.is_some() {
                return Err(InputError::AlreadyPending);
            }
            *slot = Some(Pending {
                affordance: None,
                cancel: cancel_tx,
            });
        }
        let _guard = PendingGuard { bridge: self };

        if self.cancelled.load(Ordering::SeqCst) {
            return Err(InputError::Cancelled);
        }

        let affordance = match surface.create_input_affordance(prompt) {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "cannot render input affordance; using fallback");
                return match self.fallback() {
                    Err(InputError::NoSurface) => Err(e.into()),
                    other => other,
                };
            }
        };
        match self.slot().as_mut() {
            Some(pending) => pending.affordance = Some(affordance),
            // Cancelled between registration and rendering.
            None => {
                surface.retire_affordance(affordance);
                return Err(InputError::Cancelled);
            }
        }
        debug!(field = %affordance.field, submit = %affordance.submit, "awaiting input");

        let timeout = self.timeout;
        let stall = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let line = tokio::select! {
            submitted = surface.await_submission(affordance.submit) => submitted?,
            _ = &mut cancel_rx => return Err(InputError::Cancelled),
            _ = stall => return Err(InputError::Stalled(timeout.unwrap_or_default())),
        };
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        let mut line = line;
        line.truncate(trimmed);
        Ok(line)
    }
}

/// Clears the pending slot and retires the affordance however `read_line`
/// exits, including when its future is dropped.
struct PendingGuard<'a> {
    bridge: &'a InputBridge,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let pending = self.bridge.slot().take();
        if let (Some(Pending { affordance: Some(a), .. }), Some(surface)) =
            (pending, &self.bridge.surface)
        {
            surface.retire_affordance(a);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{MemorySurface, SurfaceEvent};
    use crate::error::DisplayError;

    #[tokio::test]
    async fn no_surface_fails_by_default() {
        let bridge = InputBridge::new(InputPolicy::default());
        assert!(matches!(bridge.read_line("?").await, Err(InputError::NoSurface)));
    }

    #[tokio::test]
    async fn canned_policy_answers_immediately() {
        let bridge = InputBridge::new(InputPolicy::Canned("Custom input response".into()));
        assert_eq!(bridge.read_line("?").await.unwrap(), "Custom input response");
        assert!(!bridge.is_pending());
    }

    #[tokio::test]
    async fn submission_resumes_the_reader() {
        let (surface, mut events) = MemorySurface::new();
        let bridge = InputBridge::with_surface(surface.clone(), InputPolicy::Fail);
        let reader = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.read_line("name? ").await })
        };
        let affordance = match events.recv().await {
            Some(SurfaceEvent::InputRequested { affordance, prompt }) => {
                assert_eq!(prompt, "name? ");
                affordance
            }
            other => panic!("unexpected event {other:?}"),
        };
        assert!(bridge.is_pending());
        assert!(surface.submit(affordance.submit, "Ada\n"));
        assert_eq!(reader.await.unwrap().unwrap(), "Ada");
        assert!(!bridge.is_pending());
        assert_eq!(surface.live_affordances(), 0);
        // The prompt is a label, not output.
        assert!(surface.outputs().is_empty());
    }

    #[tokio::test]
    async fn second_request_fails_fast() {
        let (surface, mut events) = MemorySurface::new();
        let bridge = InputBridge::with_surface(surface.clone(), InputPolicy::Fail);
        let first = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.read_line("first").await })
        };
        let Some(SurfaceEvent::InputRequested { affordance, .. }) = events.recv().await else {
            panic!("no input request");
        };
        assert!(matches!(
            bridge.read_line("second").await,
            Err(InputError::AlreadyPending)
        ));
        // The first request is untouched.
        surface.submit(affordance.submit, "one");
        assert_eq!(first.await.unwrap().unwrap(), "one");
    }

    #[tokio::test]
    async fn cancel_resolves_pending_request() {
        let (surface, mut events) = MemorySurface::new();
        let bridge = InputBridge::with_surface(surface.clone(), InputPolicy::Fail);
        let reader = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.read_line("").await })
        };
        events.recv().await;
        bridge.cancel();
        assert!(matches!(reader.await.unwrap(), Err(InputError::Cancelled)));
        assert_eq!(surface.live_affordances(), 0);

        // Requests stay cancelled until reset.
        assert!(matches!(bridge.read_line("").await, Err(InputError::Cancelled)));
        bridge.reset_cancel();
        let reader = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.read_line("").await })
        };
        let Some(SurfaceEvent::InputRequested { affordance, .. }) = events.recv().await else {
            panic!("no input request");
        };
        surface.submit(affordance.submit, "ok");
        assert_eq!(reader.await.unwrap().unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_stalls() {
        let (surface, _events) = MemorySurface::new();
        let bridge = InputBridge::with_surface(surface.clone(), InputPolicy::Fail)
            .with_timeout(Some(Duration::from_secs(5)));
        match bridge.read_line("").await {
            Err(InputError::Stalled(d)) => assert_eq!(d, Duration::from_secs(5)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!bridge.is_pending());
        assert_eq!(surface.live_affordances(), 0);
    }

    #[tokio::test]
    async fn unavailable_surface_uses_policy() {
        let (surface, _events) = MemorySurface::new();
        surface.set_available(false);
        let canned = InputBridge::with_surface(surface.clone(), InputPolicy::Canned("x".into()));
        assert_eq!(canned.read_line("").await.unwrap(), "x");
        let failing = InputBridge::with_surface(surface, InputPolicy::Fail);
        assert!(matches!(
            failing.read_line("").await,
            Err(InputError::Display(DisplayError::Unavailable))
        ));
    }

    #[test]
    fn zero_timeout_means_none() {
        let bridge = InputBridge::new(InputPolicy::Fail).with_timeout(Some(Duration::ZERO));
        assert_eq!(bridge.timeout(), None);
    }
}
