//! Script-level exceptions and the unwinding signals that carry them.
//!
//! A [`Fault`] is what a Python programmer would call an exception: a type
//! name (`ZeroDivisionError`, `NameError`, …), a message, and the call stack
//! that was active when it was raised.  The stack is attached lazily by the
//! interpreter at the innermost statement that observes the fault, so value
//! operations and built-ins can raise without knowing where they run.

use std::fmt;

/// Source label shown in tracebacks, matching what an in-browser Python shows
/// for code passed to `exec`.
pub const SOURCE_LABEL: &str = "<exec>";

/// Exception type names understood by the built-in language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    SyntaxError,
    IndentationError,
    NameError,
    UnboundLocalError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    AttributeError,
    OverflowError,
    MemoryError,
    RecursionError,
    EOFError,
    RuntimeError,
    ImportError,
    ModuleNotFoundError,
}

impl FaultKind {
    pub fn name(self) -> &'static str {
        match self {
            FaultKind::SyntaxError => "SyntaxError",
            FaultKind::IndentationError => "IndentationError",
            FaultKind::NameError => "NameError",
            FaultKind::UnboundLocalError => "UnboundLocalError",
            FaultKind::TypeError => "TypeError",
            FaultKind::ValueError => "ValueError",
            FaultKind::ZeroDivisionError => "ZeroDivisionError",
            FaultKind::IndexError => "IndexError",
            FaultKind::AttributeError => "AttributeError",
            FaultKind::OverflowError => "OverflowError",
            FaultKind::MemoryError => "MemoryError",
            FaultKind::RecursionError => "RecursionError",
            FaultKind::EOFError => "EOFError",
            FaultKind::RuntimeError => "RuntimeError",
            FaultKind::ImportError => "ImportError",
            FaultKind::ModuleNotFoundError => "ModuleNotFoundError",
        }
    }

    /// Syntax-class faults render without an `in <scope>` suffix.
    fn is_syntax(self) -> bool {
        matches!(self, FaultKind::SyntaxError | FaultKind::IndentationError)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a traceback: the line being executed in a given scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: usize,
    /// `<module>` for top-level code, otherwise the function name.
    pub scope: String,
}

/// A raised script exception.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    /// Outermost frame first; `None` until the interpreter annotates it.
    frames: Option<Vec<TraceFrame>>,
    /// Offending source line, for syntax errors.
    source_line: Option<String>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Fault {
            kind,
            message: message.into(),
            frames: None,
            source_line: None,
        }
    }

    /// A syntax error at a known line, carrying the offending source text.
    pub fn syntax(kind: FaultKind, message: impl Into<String>, line: usize, source: &str) -> Self {
        let text = source
            .lines()
            .nth(line.saturating_sub(1))
            .map(|l| l.trim().to_owned());
        Fault {
            kind,
            message: message.into(),
            frames: Some(vec![TraceFrame {
                line,
                scope: "<module>".to_owned(),
            }]),
            source_line: text,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Fault::new(FaultKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Fault::new(FaultKind::ValueError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Fault::new(FaultKind::ZeroDivisionError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Fault::new(FaultKind::IndexError, message)
    }

    pub fn overflow() -> Self {
        Fault::new(FaultKind::OverflowError, "integer overflow")
    }

    /// A bare `MemoryError`, raised before an oversized allocation.
    pub fn memory() -> Self {
        Fault::new(FaultKind::MemoryError, "")
    }

    pub fn name_error(name: &str) -> Self {
        Fault::new(FaultKind::NameError, format!("name '{name}' is not defined"))
    }

    pub fn unbound_local(name: &str) -> Self {
        Fault::new(
            FaultKind::UnboundLocalError,
            format!("cannot access local variable '{name}' where it is not associated with a value"),
        )
    }

    pub fn is_annotated(&self) -> bool {
        self.frames.is_some()
    }

    /// Attach the call stack; a fault is annotated at most once.
    pub fn annotate(&mut self, frames: Vec<TraceFrame>) {
        if self.frames.is_none() {
            self.frames = Some(frames);
        }
    }

    pub fn frames(&self) -> &[TraceFrame] {
        self.frames.as_deref().unwrap_or(&[])
    }

    /// Render a Python-style traceback (no trailing newline).
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        let mut prev: Option<&TraceFrame> = None;
        let mut repeats = 0usize;
        for frame in self.frames() {
            if prev == Some(frame) {
                repeats += 1;
                if repeats >= MAX_REPEATED_FRAMES {
                    continue;
                }
            } else {
                flush_repeats(&mut out, repeats);
                repeats = 0;
            }
            prev = Some(frame);
            if self.kind.is_syntax() {
                out.push_str(&format!("  File \"{SOURCE_LABEL}\", line {}\n", frame.line));
            } else {
                out.push_str(&format!(
                    "  File \"{SOURCE_LABEL}\", line {}, in {}\n",
                    frame.line, frame.scope
                ));
            }
        }
        flush_repeats(&mut out, repeats);
        if let Some(src) = &self.source_line {
            if !src.is_empty() {
                out.push_str(&format!("    {src}\n"));
            }
        }
        out.push_str(&self.to_string());
        out
    }
}

/// Identical consecutive frames shown before collapsing the rest.
const MAX_REPEATED_FRAMES: usize = 3;

fn flush_repeats(out: &mut String, repeats: usize) {
    if repeats >= MAX_REPEATED_FRAMES {
        let hidden = repeats - (MAX_REPEATED_FRAMES - 1);
        let plural = if hidden == 1 { "" } else { "s" };
        out.push_str(&format!("  [Previous line repeated {hidden} more time{plural}]\n"));
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Non-local exits that abort the whole run.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    Fault(Fault),
    /// `exit(code)` / `quit(code)`.
    Exit(i64),
    /// The host asked the run to stop.
    Halted,
}

impl From<Fault> for Unwind {
    fn from(f: Fault) -> Self {
        Unwind::Fault(f)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let f = Fault::zero_division("division by zero");
        assert_eq!(f.to_string(), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn traceback_lists_frames_outermost_first() {
        let mut f = Fault::zero_division("division by zero");
        f.annotate(vec![
            TraceFrame { line: 3, scope: "<module>".into() },
            TraceFrame { line: 1, scope: "f".into() },
        ]);
        assert_eq!(
            f.traceback(),
            "Traceback (most recent call last):\n\
             \x20 File \"<exec>\", line 3, in <module>\n\
             \x20 File \"<exec>\", line 1, in f\n\
             ZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn annotate_only_once() {
        let mut f = Fault::name_error("x");
        f.annotate(vec![TraceFrame { line: 2, scope: "g".into() }]);
        f.annotate(vec![TraceFrame { line: 9, scope: "<module>".into() }]);
        assert_eq!(f.frames()[0].line, 2);
    }

    #[test]
    fn repeated_frames_are_collapsed() {
        let mut f = Fault::new(FaultKind::RecursionError, "maximum recursion depth exceeded");
        let mut frames = vec![TraceFrame { line: 4, scope: "<module>".into() }];
        frames.extend((0..10).map(|_| TraceFrame { line: 2, scope: "f".into() }));
        f.annotate(frames);
        let tb = f.traceback();
        assert_eq!(tb.matches("line 2, in f").count(), 3);
        assert!(tb.contains("[Previous line repeated 7 more times]"));
    }

    #[test]
    fn syntax_fault_shows_source_line() {
        let f = Fault::syntax(FaultKind::SyntaxError, "invalid syntax", 2, "x = 1\ny = (\n");
        let tb = f.traceback();
        assert!(tb.contains("line 2\n"));
        assert!(tb.contains("    y = (\n"));
        assert!(tb.ends_with("SyntaxError: invalid syntax"));
    }
}
