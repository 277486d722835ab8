//! `.pyblocksrc` configuration file parser.
//!
//! The rc file uses `/set` directives, one per line:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | set an option |
//! | Lines starting with `;` or `#` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! Recognised options:
//!
//! | Name | Values | Default |
//! |------|--------|---------|
//! | `engine` | `builtin`, `python`, `lua` | `builtin` |
//! | `input_policy` | `fail`, `canned` | `fail` |
//! | `canned_input` | any text | `Custom input response` |
//! | `input_timeout` | seconds, `0` for none | `0` |
//! | `display` | `on`, `off` | `on` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};

use crate::error::ConfigError;
use crate::input::InputPolicy;

/// Text returned by `input()` under the canned policy unless overridden.
pub const DEFAULT_CANNED_INPUT: &str = "Custom input response";

// ── EngineKind ────────────────────────────────────────────────────────────────

/// Which evaluator runs scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineKind {
    #[default]
    Builtin,
    Python,
    Lua,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "builtin" => Ok(EngineKind::Builtin),
            "python" | "py" => Ok(EngineKind::Python),
            "lua" => Ok(EngineKind::Lua),
            other => Err(format!("unknown engine '{other}' (expected builtin, python or lua)")),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::Builtin => "builtin",
            EngineKind::Python => "python",
            EngineKind::Lua => "lua",
        })
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

/// Runner settings loaded from the rc file and overridden by the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub engine: EngineKind,
    /// `true` for the canned input policy.
    pub canned: bool,
    pub canned_input: String,
    pub input_timeout: Option<Duration>,
    /// Stream output and render input prompts live.
    pub display: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineKind::Builtin,
            canned: false,
            canned_input: DEFAULT_CANNED_INPUT.to_owned(),
            input_timeout: None,
            display: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// The no-surface input policy these settings select.
    pub fn input_policy(&self) -> InputPolicy {
        if self.canned {
            InputPolicy::Canned(self.canned_input.clone())
        } else {
            InputPolicy::Fail
        }
    }

    /// Apply one `name=value` setting.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "engine" => self.engine = value.parse()?,
            "input_policy" => {
                self.canned = match value {
                    "fail" => false,
                    "canned" => true,
                    _ => return Err(format!("input_policy: expected fail or canned, got '{value}'")),
                }
            }
            "canned_input" => self.canned_input = value.to_owned(),
            "input_timeout" => self.input_timeout = parse_timeout(value)?,
            "display" => self.display = parse_switch(name, value)?,
            _ => return Err(format!("unknown option '{name}'")),
        }
        Ok(())
    }

    /// Parse an rc string.
    ///
    /// Returns the config and a list of any errors on recognised lines; bad
    /// lines leave the corresponding option at its previous value.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let errors = config.apply_str(s);
        (config, errors)
    }

    /// Apply an rc string on top of the current settings.
    pub fn apply_str(&mut self, s: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else {
                errors.push(ConfigError::Line {
                    line: lineno,
                    message: format!("expected a /set directive, found '{line}'"),
                });
                continue;
            };

            let (cmd, args) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));

            if cmd == "set" {
                let result = parse_set(args.trim()).and_then(|(name, value)| self.set(&name, &value));
                if let Err(message) = result {
                    errors.push(ConfigError::Line { line: lineno, message });
                }
            }
        }

        errors
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> Result<(Self, Vec<ConfigError>), ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::load_str(&s))
    }
}

// ── /set ─────────────────────────────────────────────────────────────────────

/// Parse `<name>=<value>` or `<name> <value>`, with optional double quotes
/// around the value.
fn parse_set(args: &str) -> Result<(String, String), String> {
    if args.is_empty() {
        return Err("/set: requires an argument".into());
    }

    let (name, value) = match args.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => match args.split_once(|c: char| c.is_ascii_whitespace()) {
            Some((name, value)) => (name, value.trim()),
            None => return Err(format!("/set: missing value for '{args}'")),
        },
    };

    if name.is_empty() {
        return Err("/set: option name cannot be empty".into());
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Ok((name.to_owned(), value.to_owned()))
}

fn parse_switch(name: &str, value: &str) -> Result<bool, String> {
    match value {
        "on" | "1" | "yes" | "true" => Ok(true),
        "off" | "0" | "no" | "false" => Ok(false),
        _ => Err(format!("{name}: expected on or off, got '{value}'")),
    }
}

/// Seconds, possibly fractional; `0` disables the timeout.
pub fn parse_timeout(value: &str) -> Result<Option<Duration>, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("input_timeout: not a number: '{value}'"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("input_timeout: out of range: '{value}'"));
    }
    Ok((secs > 0.0).then(|| Duration::from_secs_f64(secs)))
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Candidate rc file locations, most specific last.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dirs) = ProjectDirs::from("", "", "pyblocks") {
        paths.push(dirs.config_dir().join("pyblocksrc"));
    }
    if let Some(user) = UserDirs::new() {
        paths.push(user.home_dir().join(".pyblocksrc"));
    }
    paths.push(PathBuf::from("./.pyblocksrc"));
    paths
}

/// The first existing rc file, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    config_candidates().into_iter().find(|p| p.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::new();
        assert_eq!(cfg.engine, EngineKind::Builtin);
        assert_eq!(cfg.input_policy(), InputPolicy::Fail);
        assert_eq!(cfg.input_timeout, None);
        assert!(cfg.display);
    }

    #[test]
    fn set_equals_syntax() {
        let (cfg, errs) = Config::load_str("/set engine=lua");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.engine, EngineKind::Lua);
    }

    #[test]
    fn set_space_syntax() {
        let (cfg, errs) = Config::load_str("/set input_timeout 2.5");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.input_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn canned_policy_with_text() {
        let (cfg, errs) = Config::load_str(
            "/set input_policy=canned\n\
             /set canned_input \"hello world\"",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.input_policy(), InputPolicy::Canned("hello world".into()));
    }

    #[test]
    fn canned_policy_default_text() {
        let (cfg, _) = Config::load_str("/set input_policy=canned");
        assert_eq!(
            cfg.input_policy(),
            InputPolicy::Canned(DEFAULT_CANNED_INPUT.into())
        );
    }

    #[test]
    fn zero_timeout_is_none() {
        let (cfg, errs) = Config::load_str("/set input_timeout=0");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.input_timeout, None);
    }

    #[test]
    fn display_switch() {
        let (cfg, errs) = Config::load_str("/set display=off");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(!cfg.display);
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let (cfg, errs) = Config::load_str(
            ";; rc file\n\
             # also a comment\n\
             \n\
             /set engine=python\n",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.engine, EngineKind::Python);
    }

    #[test]
    fn unknown_commands_silently_skipped() {
        let (cfg, errs) = Config::load_str("/def something\n/set display=off");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(!cfg.display);
    }

    #[test]
    fn bad_lines_report_line_numbers() {
        let (cfg, errs) = Config::load_str(
            "/set engine=ruby\n\
             /set colour=red\n\
             /set input_timeout=-1\n\
             stray text\n\
             /set display=off",
        );
        let lines: Vec<usize> = errs
            .iter()
            .map(|e| match e {
                ConfigError::Line { line, .. } => *line,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
        // Good lines still apply; bad ones leave defaults.
        assert_eq!(cfg.engine, EngineKind::Builtin);
        assert!(!cfg.display);
    }

    #[test]
    fn load_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rc");
        std::fs::write(&path, "/set engine=lua\n").unwrap();
        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.engine, EngineKind::Lua);
    }

    #[test]
    fn load_file_missing_is_error() {
        let err = Config::load_file(Path::new("/nonexistent/pyblocksrc")).unwrap_err();
        assert!(err.to_string().starts_with("cannot read /nonexistent/pyblocksrc"));
    }

    #[test]
    fn candidates_end_with_working_directory() {
        let paths = config_candidates();
        assert_eq!(paths.last(), Some(&PathBuf::from("./.pyblocksrc")));
    }
}
