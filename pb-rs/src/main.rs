use std::process;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use pyblocks::capture::OutputCapture;
use pyblocks::cli::{self, CliArgs, ConfigFile, ScriptSource};
use pyblocks::config::{self, Config, EngineKind};
use pyblocks::engine::{Engine, ScriptEvaluator};
use pyblocks::host::HostBridge;
use pyblocks::input::InputBridge;
use pyblocks::script::Interpreter;
use pyblocks::streams::ScriptStreams;
use pyblocks::terminal::{LineReader, TerminalSurface};

const USAGE: &str =
    "Usage: pyblocks [-f[<file>]] [-e<engine>] [-t<secs>] [-nqd] [<script>|-]\n       \
     pyblocks [-f[<file>]] [-e<engine>] [-t<secs>] [-nqd] -c<code>";

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("pyblocks: {e}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    init_logging(args.debug);

    // ── Configuration: rc file, then command-line overrides ──────────────────
    let mut config = load_config(&args.config);
    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    if let Some(timeout) = args.input_timeout {
        config.input_timeout = timeout;
    }
    if args.no_display {
        config.display = false;
    }
    debug!(?config, "configuration loaded");

    let code = match config.engine {
        EngineKind::Builtin => session(Interpreter::new(), &config, &args).await,
        EngineKind::Python => python_session(&config, &args).await,
        EngineKind::Lua => lua_session(&config, &args).await,
    };
    process::exit(code);
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_env("PYBLOCKS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if debug { "pyblocks=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(spec: &ConfigFile) -> Config {
    let path = match spec {
        ConfigFile::Skip => return Config::new(),
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => config::find_user_config(),
    };
    let Some(path) = path else {
        return Config::new();
    };
    match Config::load_file(&path) {
        Ok((config, errors)) => {
            for e in errors {
                eprintln!("pyblocks: warning: {}: {e}", path.display());
            }
            config
        }
        Err(e) => {
            eprintln!("pyblocks: warning: {e}");
            Config::new()
        }
    }
}

#[cfg(feature = "python")]
async fn python_session(config: &Config, args: &CliArgs) -> i32 {
    session(pyblocks::python::PythonEvaluator::new(), config, args).await
}

#[cfg(not(feature = "python"))]
async fn python_session(_config: &Config, _args: &CliArgs) -> i32 {
    eprintln!("pyblocks: the python engine is not compiled in (build with --features python)");
    2
}

#[cfg(feature = "lua")]
async fn lua_session(config: &Config, args: &CliArgs) -> i32 {
    session(pyblocks::lua::LuaEvaluator::new(), config, args).await
}

#[cfg(not(feature = "lua"))]
async fn lua_session(_config: &Config, _args: &CliArgs) -> i32 {
    eprintln!("pyblocks: the lua engine is not compiled in (build with --features lua)");
    2
}

/// Wire the terminal to a host bridge and run the requested source.
async fn session<E: ScriptEvaluator>(evaluator: E, config: &Config, args: &CliArgs) -> i32 {
    let stdin_tty = unsafe { libc::isatty(libc::STDIN_FILENO) != 0 };
    let interactive = args.source == ScriptSource::Auto && stdin_tty;

    // Read the script before stdin is handed to the line reader.
    let script = if interactive {
        None
    } else {
        match read_source(&args.source).await {
            Ok(s) => Some(s),
            Err(e) => {
                eprintln!("pyblocks: {e}");
                return 2;
            }
        }
    };

    let lines = LineReader::stdin();
    let surface = Arc::new(TerminalSurface::stdio(lines.clone()));
    let policy = config.input_policy();
    let streams = if config.display {
        ScriptStreams::new(
            OutputCapture::with_surface(surface.clone()),
            InputBridge::with_surface(surface.clone(), policy).with_timeout(config.input_timeout),
        )
    } else {
        ScriptStreams::new(OutputCapture::new(), InputBridge::new(policy))
    };
    let bridge = HostBridge::new(Engine::new(evaluator, streams));
    spawn_interrupt_handler(bridge.clone(), interactive);

    let runner = Runner {
        bridge,
        surface,
        live: config.display,
        quiet: args.quiet,
    };
    match script {
        Some(script) => runner.run(&script).await,
        None => runner.interactive(&lines, config.engine).await,
    }
}

async fn read_source(source: &ScriptSource) -> Result<String, String> {
    match source {
        ScriptSource::Code(code) => Ok(code.clone()),
        ScriptSource::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("{}: {e}", path.display())),
        ScriptSource::Stdin | ScriptSource::Auto => {
            let mut s = String::new();
            tokio::io::stdin()
                .read_to_string(&mut s)
                .await
                .map_err(|e| format!("stdin: {e}"))?;
            Ok(s)
        }
    }
}

/// Ctrl-C halts the running script; when idle it leaves non-interactive runs.
fn spawn_interrupt_handler<E: ScriptEvaluator>(bridge: HostBridge<E>, interactive: bool) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if bridge.is_running() {
                bridge.halt();
            } else if !interactive {
                process::exit(130);
            } else {
                eprintln!("\n(type /quit to leave)");
            }
        }
    });
}

struct Runner<E: ScriptEvaluator> {
    bridge: HostBridge<E>,
    surface: Arc<TerminalSurface>,
    /// Output was already streamed to the terminal during the run.
    live: bool,
    quiet: bool,
}

impl<E: ScriptEvaluator> Runner<E> {
    /// Run one script and print its outcome; returns the process exit code.
    async fn run(&self, script: &str) -> i32 {
        let report = match self.bridge.run(script).await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("pyblocks: {e}");
                return 70;
            }
        };
        if !self.live {
            if let Err(e) = self.surface.print(&report.output) {
                warn!(error = %e, "cannot print output");
            }
        }
        if !self.quiet {
            if let Err(e) = self.surface.status(&report) {
                warn!(error = %e, "cannot print status line");
            }
        }
        report.exit_code()
    }

    /// Read cells separated by blank lines and run each in the same session.
    async fn interactive(&self, lines: &LineReader, engine: EngineKind) -> i32 {
        if !self.quiet {
            let ver = env!("CARGO_PKG_VERSION");
            let _ = self.surface.print(&format!(
                "pyblocks {ver} ({engine} engine)\n\
                 Enter code; a blank line runs it.  /reset clears the session, /quit exits.\n"
            ));
        }

        let mut cell = String::new();
        loop {
            let _ = self.surface.prompt(if cell.is_empty() { ">>> " } else { "... " });
            let Some(line) = lines.next_line().await else {
                break;
            };

            if cell.is_empty() {
                match line.trim() {
                    "" => continue,
                    "/quit" | "/exit" => return 0,
                    "/reset" => {
                        match self.bridge.reset() {
                            Ok(()) => {
                                let _ = self.surface.print("Session reset.\n");
                            }
                            Err(e) => eprintln!("pyblocks: {e}"),
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            if line.trim().is_empty() {
                self.run(&std::mem::take(&mut cell)).await;
                continue;
            }
            cell.push_str(&line);
            cell.push('\n');
        }

        // End of input runs whatever is left.
        if !cell.is_empty() {
            let _ = self.surface.print("\n");
            return self.run(&cell).await;
        }
        let _ = self.surface.print("\n");
        0
    }
}
