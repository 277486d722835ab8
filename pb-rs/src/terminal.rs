//! Terminal display surface: crossterm-styled output and line-based input.
//!
//! [`TerminalSurface`] plays the part of the page for the `pyblocks` binary.
//! Output elements are written to stdout as they arrive; an input affordance
//! becomes a styled prompt and its submission is the next line read from
//! stdin.  Stdin is read on a dedicated thread by [`LineReader`], which the
//! interactive session shares so that cell text and `input()` answers come
//! from the same stream.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use crossterm::{
    queue,
    style::{Attribute, Color, ContentStyle, Print, ResetColor, SetStyle},
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::display::{DisplaySurface, ElementId, InputAffordance};
use crate::engine::{RunReport, RunStatus};
use crate::error::DisplayError;

// ── LineReader ────────────────────────────────────────────────────────────────

/// Lines from stdin (or any reader), delivered asynchronously.
#[derive(Clone)]
pub struct LineReader {
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<String>>>,
}

impl LineReader {
    /// Start a thread reading stdin line by line.
    pub fn stdin() -> Self {
        Self::spawn(io::BufReader::new(io::stdin()))
    }

    /// Start a thread reading `input` line by line.
    pub fn spawn<R: BufRead + Send + 'static>(input: R) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        });
        Self::from_channel(rx)
    }

    pub fn from_channel(rx: mpsc::UnboundedReceiver<String>) -> Self {
        LineReader {
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// The next line without its terminator, or `None` at end of input.
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

// ── Styles ────────────────────────────────────────────────────────────────────

/// Style of the status line for a run outcome.
pub fn status_style(status: &RunStatus) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.foreground_color = Some(match status {
        RunStatus::Completed => Color::DarkGreen,
        RunStatus::Exited(_) => Color::DarkYellow,
        RunStatus::Faulted(_) => Color::Red,
        RunStatus::Halted => Color::DarkGrey,
    });
    style
}

/// Style of input prompts.
pub fn prompt_style() -> ContentStyle {
    let mut style = ContentStyle::new();
    style.foreground_color = Some(Color::Cyan);
    style.attributes.set(Attribute::Bold);
    style
}

// ── TerminalSurface ───────────────────────────────────────────────────────────

/// A display surface backed by a writer and a [`LineReader`].
pub struct TerminalSurface {
    out: Mutex<Box<dyn Write + Send>>,
    lines: LineReader,
    /// Emit crossterm styling (off when stdout is not a terminal).
    styled: bool,
    next_id: AtomicU64,
    /// Submit control of the affordance currently shown.
    current: Mutex<Option<ElementId>>,
}

impl TerminalSurface {
    pub fn new(out: impl Write + Send + 'static, lines: LineReader, styled: bool) -> Self {
        TerminalSurface {
            out: Mutex::new(Box::new(out)),
            lines,
            styled,
            next_id: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    /// stdout + stdin, styled when stdout is a terminal.
    pub fn stdio(lines: LineReader) -> Self {
        let styled = unsafe { libc::isatty(libc::STDOUT_FILENO) != 0 };
        Self::new(io::stdout(), lines, styled)
    }

    pub fn lines(&self) -> &LineReader {
        &self.lines
    }

    fn write_styled(&self, style: Option<ContentStyle>, text: &str) -> Result<(), DisplayError> {
        let mut guard = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let out = &mut *guard;
        match style {
            Some(style) if self.styled => {
                queue!(out, SetStyle(style), Print(text), ResetColor)?;
            }
            _ => queue!(out, Print(text))?,
        }
        out.flush()?;
        Ok(())
    }

    /// Show a prompt without a trailing newline.
    pub fn prompt(&self, text: &str) -> Result<(), DisplayError> {
        if text.is_empty() {
            return Ok(());
        }
        self.write_styled(Some(prompt_style()), text)
    }

    /// Print the report's status line.
    pub fn status(&self, report: &RunReport) -> Result<(), DisplayError> {
        self.write_styled(Some(status_style(&report.status)), &report.status_line())
    }

    /// Print plain text.
    pub fn print(&self, text: &str) -> Result<(), DisplayError> {
        self.write_styled(None, text)
    }

    fn allocate(&self) -> ElementId {
        ElementId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl DisplaySurface for TerminalSurface {
    fn create_output_element(&self, text: &str) -> Result<(), DisplayError> {
        self.print(text)
    }

    fn create_input_affordance(&self, prompt: &str) -> Result<InputAffordance, DisplayError> {
        let affordance = InputAffordance {
            field: self.allocate(),
            submit: self.allocate(),
        };
        self.prompt(prompt)?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(affordance.submit);
        Ok(affordance)
    }

    async fn await_submission(&self, submit: ElementId) -> Result<String, DisplayError> {
        let current = *self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current != Some(submit) {
            return Err(DisplayError::UnknownElement(submit.0));
        }
        self.lines.next_line().await.ok_or(DisplayError::Closed)
    }

    fn retire_affordance(&self, affordance: InputAffordance) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == Some(affordance.submit) {
            *current = None;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A writer whose contents the test can read back.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn surface(input: &str, styled: bool) -> (TerminalSurface, SharedBuf) {
        let buf = SharedBuf::default();
        let lines = LineReader::spawn(io::Cursor::new(input.to_owned()));
        (TerminalSurface::new(buf.clone(), lines, styled), buf)
    }

    #[test]
    fn output_elements_written_verbatim() {
        let (surface, buf) = surface("", false);
        surface.create_output_element("hello\n").unwrap();
        surface.create_output_element("world").unwrap();
        assert_eq!(buf.text(), "hello\nworld");
    }

    #[tokio::test]
    async fn affordance_reads_next_line() {
        let (surface, buf) = surface("Ada\nBob\n", false);
        let a = surface.create_input_affordance("name? ").unwrap();
        assert_eq!(surface.await_submission(a.submit).await.unwrap(), "Ada");
        surface.retire_affordance(a);
        assert_eq!(buf.text(), "name? ");

        let b = surface.create_input_affordance("").unwrap();
        assert_eq!(surface.await_submission(b.submit).await.unwrap(), "Bob");
    }

    #[tokio::test]
    async fn end_of_input_closes_affordance() {
        let (surface, _buf) = surface("", false);
        let a = surface.create_input_affordance("? ").unwrap();
        assert!(matches!(
            surface.await_submission(a.submit).await,
            Err(DisplayError::Closed)
        ));
    }

    #[tokio::test]
    async fn retired_affordance_is_unknown() {
        let (surface, _buf) = surface("x\n", false);
        let a = surface.create_input_affordance("").unwrap();
        surface.retire_affordance(a);
        assert!(matches!(
            surface.await_submission(a.submit).await,
            Err(DisplayError::UnknownElement(_))
        ));
    }

    #[test]
    fn status_line_plain_and_styled() {
        let report = RunReport {
            status: RunStatus::Exited(2),
            output: String::new(),
            elapsed: Duration::ZERO,
        };
        let (plain, buf) = surface("", false);
        plain.status(&report).unwrap();
        assert_eq!(buf.text(), "Program exited with code: 2\n\n");

        let (styled, buf) = surface("", true);
        styled.status(&report).unwrap();
        let text = buf.text();
        assert!(text.contains("Program exited with code: 2\n\n"));
        assert!(text.starts_with('\x1b'));
    }

    #[test]
    fn status_colours_differ_by_outcome() {
        assert_ne!(
            status_style(&RunStatus::Completed).foreground_color,
            status_style(&RunStatus::Faulted(String::new())).foreground_color
        );
    }

    #[tokio::test]
    async fn line_reader_strips_terminators() {
        let lines = LineReader::spawn(io::Cursor::new("a\r\nb\n".to_owned()));
        assert_eq!(lines.next_line().await.as_deref(), Some("a"));
        assert_eq!(lines.next_line().await.as_deref(), Some("b"));
        assert_eq!(lines.next_line().await, None);
    }
}
