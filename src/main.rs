// steptrace: sandboxed step-by-step tracer for a Python teaching subset

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use steptrace::explain::{annotate, AnnotatedEvent, CommandExplainer, ExplainMode, Explainer};
use steptrace::sandbox::executor::run_executor;
use steptrace::sandbox::orchestrator::RunSummary;
use steptrace::sandbox::protocol::ExecRequest;
use steptrace::sandbox::{ExecutorCommand, Orchestrator, SandboxConfig, TraceLimits};
use steptrace::ui::print_run;

/// Deep recursion in traced programs runs on the executor's main thread
const EXECUTOR_STACK_SIZE: usize = 256 << 20;

#[derive(Debug, Parser)]
#[command(name = "steptrace", version, about = "Trace a Python program line by line in a sandbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trace a program and print every step
    Run(RunArgs),
    /// Internal: execute one JSON request from stdin
    #[command(hide = true)]
    Executor,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Program to trace
    file: PathBuf,

    /// File fed to the program's standard input
    #[arg(long)]
    stdin: Option<PathBuf>,

    /// Trace events allowed before the run is cut off
    #[arg(long, env = "STEPTRACE_MAX_STEPS", default_value_t = 50_000)]
    max_steps: u64,

    /// Wall-clock budget in seconds
    #[arg(long, env = "STEPTRACE_TIMEOUT", default_value_t = 8.0)]
    timeout: f64,

    /// Maximum length of a rendered value
    #[arg(long, env = "STEPTRACE_RENDER_LIMIT", default_value_t = steptrace::trace::render::DEFAULT_RENDER_LIMIT)]
    render_limit: usize,

    /// Grace period in seconds past the timeout before the executor is killed
    #[arg(long, env = "STEPTRACE_KILL_GRACE", default_value_t = 2.0)]
    kill_grace: f64,

    /// Never kill the executor, rely on the in-process budget only
    #[arg(long)]
    no_kill: bool,

    /// Print the run as JSON
    #[arg(long)]
    json: bool,

    /// Command that receives each event's prompt on stdin and prints an explanation
    #[arg(long, env = "STEPTRACE_EXPLAIN_CMD")]
    explain_cmd: Option<String>,

    /// Seconds one explain command may run before it is killed
    #[arg(long, env = "STEPTRACE_EXPLAIN_TIMEOUT", default_value_t = 10.0)]
    explain_timeout: f64,

    /// Explain every event, not only the ones that changed something
    #[arg(long, requires = "explain_cmd")]
    explain_all: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: RunSummary<'a>,
    steps: u64,
    duration_ms: u64,
    events: Vec<AnnotatedEvent<'a>>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("steptrace=info")),
        )
        .with_writer(io::stderr)
        .init();
}

fn executor() -> Result<i32> {
    let worker = thread::Builder::new()
        .name("executor".to_string())
        .stack_size(EXECUTOR_STACK_SIZE)
        .spawn(|| run_executor(io::stdin().lock(), io::stdout().lock()))
        .context("failed to start executor thread")?;
    match worker.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("executor thread panicked"),
    }
}

fn run(args: RunArgs) -> Result<i32> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let stdin = match &args.stdin {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => String::new(),
    };

    let kill_grace = if args.no_kill {
        None
    } else {
        Some(Duration::try_from_secs_f64(args.kill_grace).context("invalid kill grace")?)
    };
    let executor = ExecutorCommand::current_exe().context("failed to locate steptrace binary")?;
    let orchestrator = Orchestrator::new(SandboxConfig::new(executor).with_kill_grace(kill_grace));

    let request = ExecRequest {
        source,
        stdin,
        limits: TraceLimits {
            max_steps: args.max_steps,
            hard_timeout_secs: args.timeout,
            render_limit: args.render_limit,
            ..TraceLimits::default()
        },
    };
    debug!(file = %args.file.display(), "tracing program");
    let result = orchestrator.run_request(&request)?;

    let explain_timeout =
        Duration::try_from_secs_f64(args.explain_timeout).context("invalid explain timeout")?;
    let explainer = args
        .explain_cmd
        .as_deref()
        .and_then(CommandExplainer::from_command_line)
        .map(|explainer| explainer.with_timeout(explain_timeout));
    let mode = if args.explain_all {
        ExplainMode::All
    } else {
        ExplainMode::OnlyChanges
    };
    let events = annotate(
        &result.events,
        explainer.as_ref().map(|explainer| explainer as &dyn Explainer),
        mode,
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        let report = JsonReport {
            summary: result.summary(),
            steps: result.steps,
            duration_ms: result.duration_ms,
            events,
        };
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        let color =
            !args.no_color && std::env::var_os("NO_COLOR").is_none() && stdout.is_terminal();
        print_run(&mut out, &events, &result, color)?;
    }

    Ok(match result.exit_status {
        _ if result.crashed => 2,
        Some(code) if code >= 0 => code,
        _ => 1,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let code = match cli.command {
        Command::Run(args) => run(args)?,
        Command::Executor => executor()?,
    };
    process::exit(code)
}
