//! End-to-end sessions: a host bridge wired to an in-memory display surface,
//! driven the way a page would drive it.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc::UnboundedReceiver;

use pyblocks::capture::OutputCapture;
use pyblocks::display::{InputAffordance, MemorySurface, SurfaceEvent};
use pyblocks::engine::{Engine, RunStatus};
use pyblocks::error::BridgeError;
use pyblocks::host::HostBridge;
use pyblocks::input::{InputBridge, InputPolicy};
use pyblocks::script::Interpreter;
use pyblocks::streams::ScriptStreams;

struct Page {
    bridge: HostBridge<Interpreter>,
    surface: Arc<MemorySurface>,
    events: UnboundedReceiver<SurfaceEvent>,
}

impl Page {
    fn new() -> Self {
        Self::with_timeout(None)
    }

    fn with_timeout(timeout: Option<Duration>) -> Self {
        let (surface, events) = MemorySurface::new();
        let streams = ScriptStreams::new(
            OutputCapture::with_surface(surface.clone()),
            InputBridge::with_surface(surface.clone(), InputPolicy::Fail).with_timeout(timeout),
        );
        Page {
            bridge: HostBridge::new(Engine::new(Interpreter::new(), streams)),
            surface,
            events,
        }
    }

    /// Wait for the next input request, skipping output events.
    async fn next_request(&mut self) -> (InputAffordance, String) {
        loop {
            match self.events.recv().await {
                Some(SurfaceEvent::InputRequested { affordance, prompt }) => {
                    return (affordance, prompt)
                }
                Some(SurfaceEvent::Output(_)) => {}
                None => panic!("surface event channel closed"),
            }
        }
    }
}

fn completed_line() -> Regex {
    Regex::new(r"^Program completed in \d+\.\d{2} seconds\n\n$").unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn hello_world_report() {
    let page = Page::new();
    let report = page.bridge.run("print(\"hi\")").await.unwrap();
    assert_eq!(report.output, "hi\n");
    assert!(completed_line().is_match(&report.status_line()));
    assert_eq!(page.surface.outputs(), vec!["hi\n"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn greeting_with_submitted_name() {
    let mut page = Page::new();
    let run = {
        let bridge = page.bridge.clone();
        tokio::spawn(async move {
            bridge
                .run("name = input(\"name? \")\nprint(\"Hello, \" + name)")
                .await
        })
    };
    let (affordance, prompt) = page.next_request().await;
    assert_eq!(prompt, "name? ");
    assert!(page.surface.submit(affordance.submit, "Ada"));

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.output, "Hello, Ada\n");
    assert!(completed_line().is_match(&report.status_line()));
}

#[tokio::test(flavor = "multi_thread")]
async fn output_order_across_suspension() {
    let mut page = Page::new();
    let run = {
        let bridge = page.bridge.clone();
        tokio::spawn(async move {
            bridge
                .run("print('A')\nprint('B')\nx = input()\nprint('C' + x)")
                .await
        })
    };

    // Output written before the suspension is already visible.
    let mut seen = Vec::new();
    let affordance = loop {
        match page.events.recv().await {
            Some(SurfaceEvent::Output(text)) => seen.push(text),
            Some(SurfaceEvent::InputRequested { affordance, .. }) => break affordance,
            None => panic!("surface closed"),
        }
    };
    assert_eq!(seen, vec!["A\n", "B\n"]);

    page.surface.submit(affordance.submit, "!");
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.output, "A\nB\nC!\n");
    assert_eq!(page.surface.outputs(), vec!["A\n", "B\n", "C!\n"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn exit_code_report() {
    let page = Page::new();
    let report = page.bridge.run("print('x')\nexit(7)").await.unwrap();
    assert_eq!(report.status_line(), "Program exited with code: 7\n\n");
    assert_eq!(report.output, "x\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn division_by_zero_report() {
    let page = Page::new();
    let report = page.bridge.run("1/0").await.unwrap();
    let line = report.status_line();
    assert!(line.starts_with("Error: "));
    assert!(line.contains("ZeroDivisionError"));
    assert!(line.ends_with("\n\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn session_continuity() {
    let page = Page::new();
    page.bridge.run("x = 1").await.unwrap();
    let report = page.bridge.run("print(x)").await.unwrap();
    assert_eq!(report.output, "1\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn reports_are_drained_per_run() {
    let page = Page::new();
    page.bridge.run("print('one')").await.unwrap();
    let report = page.bridge.run("print('two')").await.unwrap();
    assert_eq!(report.output, "two\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_run_is_busy() {
    let mut page = Page::new();
    let first = {
        let bridge = page.bridge.clone();
        tokio::spawn(async move { bridge.run("input()").await })
    };
    let (affordance, _) = page.next_request().await;
    assert!(matches!(page.bridge.run("print(1)").await, Err(BridgeError::Busy)));
    page.surface.submit(affordance.submit, "");
    assert!(first.await.unwrap().unwrap().is_success());
}

#[tokio::test(flavor = "multi_thread")]
async fn halt_while_waiting_for_input() {
    let mut page = Page::new();
    let run = {
        let bridge = page.bridge.clone();
        tokio::spawn(async move { bridge.run("print('start')\ninput()\nprint('never')").await })
    };
    page.next_request().await;
    page.bridge.halt();
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(report.output, "start\n");
    assert_eq!(page.surface.live_affordances(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn halt_infinite_loop() {
    let page = Page::new();
    let run = {
        let bridge = page.bridge.clone();
        tokio::spawn(async move { bridge.run("while True:\n    pass\n").await })
    };
    while !page.bridge.is_running() {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    page.bridge.halt();
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.status_line(), "Program halted by user\n\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn input_timeout_is_eof() {
    let page = Page::with_timeout(Some(Duration::from_millis(50)));
    let report = page.bridge.run("x = input('?')").await.unwrap();
    let line = report.status_line();
    assert!(line.contains("EOFError: no input received within 0.05 seconds"), "{line}");
    assert!(!page.bridge.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_surface_still_captures_output() {
    let page = Page::new();
    page.surface.set_available(false);
    let report = page.bridge.run("print('kept')").await.unwrap();
    assert_eq!(report.output, "kept\n");
    assert!(page.surface.outputs().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn canned_policy_without_surface() {
    let streams = ScriptStreams::new(
        OutputCapture::new(),
        InputBridge::new(InputPolicy::Canned("Custom input response".into())),
    );
    let bridge = HostBridge::new(Engine::new(Interpreter::new(), streams));
    let report = bridge.run("print(input('prompt'))").await.unwrap();
    assert_eq!(report.output, "Custom input response\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_starts_a_fresh_namespace() {
    let page = Page::new();
    page.bridge.run("def f():\n    return 1\n").await.unwrap();
    page.bridge.reset().unwrap();
    let report = page.bridge.run("f()").await.unwrap();
    assert!(report.status_line().contains("NameError: name 'f' is not defined"));
}

#[tokio::test(flavor = "multi_thread")]
async fn block_editor_program() {
    let mut page = Page::new();
    let src = "\
def average(numbers):
    return sum(numbers) / len(numbers)

scores = []
for i in range(3):
    scores.append(int(input('score: ')))
print('Average:', round(average(scores), 1))
";
    let run = {
        let bridge = page.bridge.clone();
        tokio::spawn(async move { bridge.run(src).await })
    };
    for answer in ["90", "85", "77"] {
        let (affordance, prompt) = page.next_request().await;
        assert_eq!(prompt, "score: ");
        page.surface.submit(affordance.submit, answer);
    }
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.output, "Average: 84.0\n");
}
