use proptest::prelude::*;

use pyblocks::capture::OutputCapture;
use pyblocks::engine::{Engine, RunStatus};
use pyblocks::script::stmt::parse_program;
use pyblocks::script::Interpreter;

fn engine() -> Engine<Interpreter> {
    Engine::headless(Interpreter::new())
}

proptest! {
    /// The parser returns Ok or Err on arbitrary input; it never panics.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = parse_program(&s);
    }
}

proptest! {
    /// Every run yields exactly one report, whatever the script text.
    #[test]
    fn any_text_yields_a_report(s in "[a-z0-9 ()+/=:\\n'-]{0,60}") {
        let mut engine = engine();
        let mut ns = engine.new_namespace();
        let report = engine.run(&s, &mut ns);
        prop_assert!(report.status_line().ends_with("\n\n"));
        prop_assert!(engine.streams().output().is_empty());
    }
}

proptest! {
    /// Chunks come back in write order, and a second drain is empty.
    #[test]
    fn capture_preserves_order(chunks in proptest::collection::vec("\\PC{0,8}", 0..20)) {
        let out = OutputCapture::new();
        for c in &chunks {
            out.write(c);
        }
        prop_assert_eq!(out.drain(), chunks.concat());
        prop_assert_eq!(out.drain(), "");
    }
}

proptest! {
    /// Printed integers match Rust's rendering.
    #[test]
    fn print_int_round_trips(n in any::<i32>()) {
        let mut engine = engine();
        let mut ns = engine.new_namespace();
        let report = engine.run(&format!("print({n})"), &mut ns);
        prop_assert_eq!(report.status, RunStatus::Completed);
        prop_assert_eq!(report.output, format!("{n}\n"));
    }

    /// exit(c) always reports exactly c.
    #[test]
    fn exit_code_is_reported(c in 0i64..100_000) {
        let mut engine = engine();
        let mut ns = engine.new_namespace();
        let report = engine.run(&format!("exit({c})"), &mut ns);
        prop_assert_eq!(report.status_line(), format!("Program exited with code: {c}\n\n"));
    }

    /// Integer addition agrees with checked i64 arithmetic.
    #[test]
    fn addition_matches(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let mut engine = engine();
        let mut ns = engine.new_namespace();
        let report = engine.run(&format!("print({a} + {b})"), &mut ns);
        prop_assert_eq!(report.output, format!("{}\n", a + b));
    }

    /// Strings survive a print verbatim.
    #[test]
    fn string_literal_prints_verbatim(s in "[a-zA-Z0-9 ,.!?]{0,30}") {
        let mut engine = engine();
        let mut ns = engine.new_namespace();
        let report = engine.run(&format!("print('{s}')"), &mut ns);
        prop_assert_eq!(report.output, format!("{s}\n"));
    }
}
