//! Run the `pyblocks` binary end to end and check what lands on stdout plus
//! the process exit code.
//!
//! Every invocation passes `-f` so a user rc file never leaks into a test.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn binary() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_pyblocks"))
}

/// Run the binary with `args`, feeding `stdin` to it.
fn run(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(binary())
        .args(args)
        .env_remove("PYBLOCKS_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn pyblocks");
    {
        let mut pipe = child.stdin.take().expect("stdin not open");
        pipe.write_all(stdin.as_bytes()).expect("write to stdin");
    }
    child.wait_with_output().expect("wait failed")
}

/// Strip ANSI escape sequences.
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek().copied() {
                Some('[') => {
                    chars.next();
                    for c2 in chars.by_ref() {
                        if c2.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn stdout(out: &Output) -> String {
    strip_ansi(&String::from_utf8_lossy(&out.stdout))
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn script_file(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write script");
    path.to_string_lossy().into_owned()
}

// ── Test cases ────────────────────────────────────────────────────────────────

#[test]
fn code_flag_runs_and_reports() {
    let out = run(&["-f", "-c", "print('hi')"], "");
    let text = stdout(&out);
    let re = regex::Regex::new(r"^hi\nProgram completed in \d+\.\d{2} seconds\n\n$").unwrap();
    assert!(re.is_match(&text), "{text:?}");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn script_from_stdin() {
    let out = run(&["-f", "-q", "-"], "for i in range(3):\n    print(i)\n");
    assert_eq!(stdout(&out), "0\n1\n2\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn quiet_suppresses_status_line() {
    let out = run(&["-f", "-q", "-c", "print(1 + 1)"], "");
    assert_eq!(stdout(&out), "2\n");
}

#[test]
fn exit_code_is_propagated() {
    let out = run(&["-f", "-c", "print('bye')\nexit(3)"], "");
    assert_eq!(stdout(&out), "bye\nProgram exited with code: 3\n\n");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn fault_reports_traceback() {
    let out = run(&["-f", "-c", "x = 1\ny = x / 0"], "");
    let text = stdout(&out);
    assert!(text.starts_with("Error: Traceback (most recent call last):\n"), "{text:?}");
    assert!(text.contains("ZeroDivisionError: division by zero"), "{text:?}");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn input_comes_from_stdin_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = script_file(
        &dir,
        "greet.py",
        "name = input('name? ')\nprint('Hello, ' + name)\n",
    );
    let out = run(&["-f", "-q", path.as_str()], "Ada\n");
    assert_eq!(stdout(&out), "name? Hello, Ada\n");
}

#[test]
fn no_display_uses_canned_policy_from_rc() {
    let dir = tempfile::tempdir().unwrap();
    let rc = script_file(&dir, "rc", "/set input_policy=canned\n/set canned_input=\"Grace\"\n");
    let out = run(
        &["-f", rc.as_str(), "-n", "-q", "-c", "print('got ' + input('who? '))"],
        "",
    );
    assert_eq!(stdout(&out), "got Grace\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn no_display_without_canned_input_is_eof() {
    let out = run(&["-f", "-n", "-c", "input()"], "ignored\n");
    let text = stdout(&out);
    assert!(text.contains("EOFError"), "{text:?}");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn closed_stdin_during_input_is_eof() {
    let dir = tempfile::tempdir().unwrap();
    let path = script_file(&dir, "ask.py", "print('asking')\ninput('> ')\nprint('unreached')\n");
    let out = run(&[path.as_str(), "-f"], "");
    let text = stdout(&out);
    assert!(text.starts_with("asking\n> "), "{text:?}");
    assert!(text.contains("EOFError"), "{text:?}");
    assert!(!text.contains("unreached"));
}

#[test]
fn missing_script_file() {
    let out = run(&["/nonexistent/pyblocks/script.py", "-f"], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("/nonexistent/pyblocks/script.py"));
}

#[test]
fn bad_option_prints_usage() {
    let out = run(&["-z"], "");
    assert_eq!(out.status.code(), Some(2));
    let err = stderr(&out);
    assert!(err.contains("unknown option: -z"));
    assert!(err.contains("Usage: pyblocks"));
}

#[test]
fn unknown_engine_is_rejected() {
    let out = run(&["-f", "-e", "cobol", "-c", "pass"], "");
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn bad_rc_line_warns_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let rc = script_file(&dir, "rc", "/set bogus=1\n");
    let out = run(&["-f", rc.as_str(), "-q", "-c", "print('still runs')"], "");
    assert_eq!(stdout(&out), "still runs\n");
    assert!(stderr(&out).contains("warning"));
}
