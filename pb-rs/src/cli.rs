//! Command-line argument parsing.
//!
//! Usage:
//!   pyblocks [-f[<file>]] [-e<engine>] [-t<secs>] [-nqd] [<script>|-]
//!   pyblocks [-f[<file>]] [-e<engine>] [-t<secs>] [-nqd] -c<code>

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{parse_timeout, EngineKind};

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Evaluator override (`-e<engine>`).
    pub engine: Option<EngineKind>,
    /// Input timeout override (`-t<secs>`, `0` for none).
    pub input_timeout: Option<Option<Duration>>,
    /// No live display: print output after each run, answer input by policy (`-n`).
    pub no_display: bool,
    /// Suppress status lines and the banner (`-q`).
    pub quiet: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// What to run.
    pub source: ScriptSource,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the standard locations (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where the script comes from.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ScriptSource {
    /// No script: interactive session if stdin is a terminal, else stdin.
    #[default]
    Auto,
    /// `-`: read the whole script from stdin.
    Stdin,
    /// `-c<code>`.
    Code(String),
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    // Value of an option taking an argument: the rest of this arg, or the next.
    fn take_value(
        chars: &[char],
        j: &mut usize,
        argv: &[String],
        i: &mut usize,
        flag: char,
        what: &str,
    ) -> Result<String, String> {
        if *j + 1 < chars.len() {
            let s: String = chars[*j + 1..].iter().collect();
            *j = chars.len();
            Ok(s)
        } else if *i + 1 < argv.len() {
            *i += 1;
            Ok(argv[*i].clone())
        } else {
            Err(format!("-{flag} requires {what} argument"))
        }
    }

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'q' => args.quiet = true,
                'n' => args.no_display = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                'c' => {
                    let code = take_value(&chars, &mut j, argv, &mut i, 'c', "a code")?;
                    args.source = ScriptSource::Code(code);
                }

                'e' => {
                    let name = take_value(&chars, &mut j, argv, &mut i, 'e', "an engine")?;
                    args.engine = Some(name.parse()?);
                }

                't' => {
                    let secs = take_value(&chars, &mut j, argv, &mut i, 't', "a seconds")?;
                    args.input_timeout = Some(parse_timeout(&secs)?);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match (positional.len(), &args.source) {
        (0, _) => {}
        (1, ScriptSource::Auto) => {
            let p = positional.remove(0);
            args.source = if p == "-" {
                ScriptSource::Stdin
            } else {
                ScriptSource::File(PathBuf::from(p))
            };
        }
        (_, ScriptSource::Code(_)) => return Err("-c cannot be combined with a script".into()),
        (n, _) => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
