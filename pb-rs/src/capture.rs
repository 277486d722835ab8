//! Output capture channel.
//!
//! Everything a script prints goes through [`OutputCapture::write`]: the text
//! is appended to the buffer and, when a display surface is attached, mirrored
//! into exactly one output element.  The engine drains the buffer once per run
//! to build the report.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::display::DisplaySurface;

/// Buffered, optionally live-streamed script output.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Clone, Default)]
pub struct OutputCapture {
    chunks: Arc<Mutex<Vec<String>>>,
    surface: Option<Arc<dyn DisplaySurface>>,
}

impl std::fmt::Debug for OutputCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCapture")
            .field("chunks", &self.lock().len())
            .field("surface", &self.surface.is_some())
            .finish()
    }
}

impl OutputCapture {
    /// A capture with no display surface.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(surface: Arc<dyn DisplaySurface>) -> Self {
        OutputCapture {
            chunks: Arc::default(),
            surface: Some(surface),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// Append `text` and forward it to the surface.
    ///
    /// The buffer is updated first; a display failure is logged and does not
    /// affect the capture.
    pub fn write(&self, text: &str) {
        self.lock().push(text.to_owned());
        if let Some(surface) = &self.surface {
            if let Err(e) = surface.create_output_element(text) {
                warn!(error = %e, "failed to render output element");
            }
        }
    }

    /// Take everything written since the last drain.
    pub fn drain(&self) -> String {
        self.drain_chunks().concat()
    }

    /// Take the individual writes since the last drain, in order.
    pub fn drain_chunks(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemorySurface;

    #[test]
    fn drain_returns_then_clears() {
        let out = OutputCapture::new();
        out.write("a");
        out.write("b\n");
        assert_eq!(out.drain(), "ab\n");
        assert_eq!(out.drain(), "");
        assert!(out.is_empty());
    }

    #[test]
    fn chunks_keep_write_boundaries() {
        let out = OutputCapture::new();
        out.write("one");
        out.write("");
        out.write("two");
        assert_eq!(out.drain_chunks(), vec!["one", "", "two"]);
    }

    #[test]
    fn each_write_becomes_one_element() {
        let (surface, _events) = MemorySurface::new();
        let out = OutputCapture::with_surface(surface.clone());
        out.write("hello\n");
        out.write("world\n");
        assert_eq!(surface.outputs(), vec!["hello\n", "world\n"]);
        assert_eq!(out.drain(), "hello\nworld\n");
    }

    #[test]
    fn unavailable_surface_still_captures() {
        let (surface, _events) = MemorySurface::new();
        surface.set_available(false);
        let out = OutputCapture::with_surface(surface.clone());
        out.write("kept");
        assert_eq!(out.drain(), "kept");
        assert!(surface.outputs().is_empty());
    }

    #[test]
    fn clones_share_the_buffer() {
        let out = OutputCapture::new();
        let other = out.clone();
        other.write("x");
        assert_eq!(out.drain(), "x");
    }
}
