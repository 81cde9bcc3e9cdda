// End-to-end tests: each run spawns the real `steptrace executor` process

use std::time::Duration;

use steptrace::sandbox::protocol::ExecRequest;
use steptrace::sandbox::{ExecutorCommand, Orchestrator, RunResult, SandboxConfig, TraceLimits};
use steptrace::trace::TraceEvent;

fn orchestrator() -> Orchestrator {
    let executor = ExecutorCommand::steptrace(env!("CARGO_BIN_EXE_steptrace"));
    Orchestrator::new(SandboxConfig::new(executor).with_poll_interval(Duration::from_millis(20)))
}

fn run(source: &str) -> RunResult {
    orchestrator()
        .run(source, "", 50_000, 8.0)
        .expect("Orchestration failed")
}

#[test]
fn test_normal_run() {
    let result = run("x = 1\nx = 2\nprint(x)\n");
    assert_eq!(result.stdout, "2\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_status, Some(0));
    assert!(result.completed);
    assert!(!result.crashed);
    assert!(!result.timed_out);
    assert_eq!(result.steps as usize, result.events.len());
    assert!(matches!(&result.events[0], TraceEvent::Call { function_name, .. } if function_name == "<module>"));

    let summary = result.summary();
    assert_eq!(summary.events_count, result.events.len());
    assert_eq!(summary.stdout, "2\n");
}

#[test]
fn test_stdin_reaches_the_program() {
    let result = orchestrator()
        .run("line = input()\nprint(line.upper())\n", "shout\n", 1_000, 8.0)
        .unwrap();
    assert_eq!(result.stdout, "SHOUT\n");
}

#[test]
fn test_uncaught_exception() {
    let result = run("a = 1\nb = 0\nc = a / b\n");
    assert_eq!(result.exit_status, Some(1));
    assert!(!result.crashed);
    assert!(result.stderr.contains("ZeroDivisionError: division by zero"));
    assert!(result
        .events
        .iter()
        .any(|event| matches!(event, TraceEvent::Exception { line: 3, .. })));
}

#[test]
fn test_step_budget() {
    let result = orchestrator()
        .run("while True:\n    pass\n", "", 10, 8.0)
        .unwrap();
    assert!(result.timed_out);
    assert!(!result.crashed);
    assert_eq!(result.exit_status, Some(0));
    assert_eq!(result.events.len(), 11);
    assert!(result.events.last().unwrap().is_budget_exceeded());
}

#[test]
fn test_syntax_error_has_no_events() {
    let result = run("def broken(:\n");
    assert!(result.events.is_empty());
    assert_eq!(result.exit_status, Some(1));
    assert!(result.stderr.contains("SyntaxError"));
}

#[test]
fn test_runs_are_isolated() {
    let orchestrator = orchestrator();
    orchestrator.run("import sys\nsys.setrecursionlimit(50)\nleak = 1\n", "", 1_000, 8.0).unwrap();
    let result = orchestrator
        .run(
            "import sys\nprint(sys.getrecursionlimit())\ntry:\n    print(leak)\nexcept NameError:\n    print('clean')\n",
            "",
            1_000,
            8.0,
        )
        .unwrap();
    assert_eq!(result.stdout, "1000\nclean\n");
}

#[cfg(unix)]
#[test]
fn test_abort_is_a_crash() {
    let result = run("import os\nprint('before')\nos.abort()\n");
    assert!(result.crashed);
    assert!(!result.completed);
    assert_eq!(result.signal, Some(libc::SIGABRT));
    assert_eq!(result.exit_status, Some(-libc::SIGABRT));
    assert!(result
        .events
        .iter()
        .any(|event| matches!(event, TraceEvent::Line { line: 3, .. })));
}

#[cfg(unix)]
#[test]
fn test_segfault_is_a_crash() {
    let result = run("import os\nimport signal\nos.kill(os.getpid(), signal.SIGSEGV)\n");
    assert!(result.crashed);
    assert_eq!(result.signal, Some(libc::SIGSEGV));
}

#[cfg(unix)]
#[test]
fn test_sleeping_executor_is_killed() {
    let executor = ExecutorCommand::steptrace(env!("CARGO_BIN_EXE_steptrace"));
    let config = SandboxConfig::new(executor)
        .with_poll_interval(Duration::from_millis(20))
        .with_kill_grace(Some(Duration::from_millis(200)));
    let request = ExecRequest {
        source: "import time\ntime.sleep(30)\n".to_string(),
        stdin: String::new(),
        limits: TraceLimits {
            hard_timeout_secs: 0.2,
            ..TraceLimits::default()
        },
    };
    let result = Orchestrator::new(config).run_request(&request).unwrap();
    assert!(result.killed);
    assert!(result.crashed);
    assert!(!result.completed);
    assert!(result.duration_ms < 10_000);
}

#[cfg(unix)]
#[test]
fn test_signalling_other_processes_is_refused() {
    let result = run("import os\nimport signal\nos.kill(0, signal.SIGTERM)\n");
    assert!(!result.crashed);
    assert!(result.completed);
    assert_eq!(result.exit_status, Some(1));
    assert!(result.stderr.contains("OSError: [Errno 1] Operation not permitted"));

    let result = run(
        "import os\nimport signal\ntry:\n    os.kill(-1, signal.SIGKILL)\nexcept OSError:\n    print('refused')\n",
    );
    assert_eq!(result.stdout, "refused\n");
    assert_eq!(result.exit_status, Some(0));
}
