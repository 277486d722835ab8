//! Error types shared across the crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of the display surface.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// The surface has not been mounted, or was torn down.
    #[error("display surface unavailable")]
    Unavailable,
    #[error("unknown display element #{0}")]
    UnknownElement(u64),
    /// The element was removed before it produced a value.
    #[error("display element closed")]
    Closed,
    #[error("display I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a blocking `input()` request.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("an input request is already pending")]
    AlreadyPending,
    #[error("no display surface to read input from")]
    NoSurface,
    #[error("no input received within {} seconds", .0.as_secs_f64())]
    Stalled(Duration),
    /// The host halted the run while the request was pending.
    #[error("input request cancelled")]
    Cancelled,
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Failures of the host bridge itself (not of the script).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("a script is already running")]
    Busy,
    #[error("script worker panicked")]
    Panicked,
}

/// Failures while loading the rc file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A recognised directive with a bad argument.  Non-fatal.
    #[error("line {line}: {message}")]
    Line { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stalled_message_in_seconds() {
        let e = InputError::Stalled(Duration::from_secs(30));
        assert_eq!(e.to_string(), "no input received within 30 seconds");
    }

    #[test]
    fn display_error_converts_into_input_error() {
        let e: InputError = DisplayError::Closed.into();
        assert!(matches!(e, InputError::Display(DisplayError::Closed)));
        assert_eq!(e.to_string(), "display element closed");
    }
}
