//! The isolated executor
//!
//! Runs inside the child process started by the orchestrator: reads one
//! [`ExecRequest`], runs the program under a [`StepTracer`] that streams
//! every event as it happens, then always finishes with the `stdout`,
//! `stderr` and `done` messages.
//!
//! # Exit status
//!
//! - `0` when the program finished or the trace budget stopped it
//! - `1` for a syntax error or an uncaught exception (traceback in stderr)
//! - the requested code for `sys.exit(n)`

use crate::interpreter::errors::{format_traceback, ExceptionKind, RaisedException, RuntimeError};
use crate::interpreter::terminal::Terminal;
use crate::interpreter::{Interpreter, USER_FILENAME};
use crate::memory::repr::str_string;
use crate::memory::value::Value;
use crate::parser::{parse_source, ParseError};
use crate::sandbox::protocol::{ExecRequest, JsonLinesSink, Message};
use crate::trace::tracer::StepTracer;
use anyhow::Context;
use std::io::{Read, Write};
use tracing::debug;

/// Report a syntax error the way an uncaught `SyntaxError` would look
fn syntax_error_report(err: &ParseError, source: &str) -> String {
    let mut out = format!("  File \"{}\", line {}\n", USER_FILENAME, err.location.line);
    if let Some(text) = err
        .location
        .line
        .checked_sub(1)
        .and_then(|index| source.lines().nth(index))
    {
        let trimmed = text.trim_start();
        let indent = text.len() - trimmed.len();
        let trimmed = trimmed.trim_end();
        out.push_str(&format!("    {}\n", trimmed));
        let caret = err.location.column.saturating_sub(1).saturating_sub(indent);
        out.push_str(&format!("    {}^\n", " ".repeat(caret.min(trimmed.len()))));
    }
    out.push_str(&format!("SyntaxError: {}\n", err.message));
    out
}

/// Exit code for `sys.exit(arg)`, writing a non-integer argument to stderr
fn system_exit_code(raised: &RaisedException, terminal: &mut Terminal) -> i32 {
    match raised.object.args.first() {
        None | Some(Value::None) => 0,
        Some(Value::Int(code)) => i32::try_from(*code).unwrap_or(i32::MAX),
        Some(Value::Bool(flag)) => i32::from(*flag),
        Some(other) => {
            terminal.write_stderr(&str_string(other));
            terminal.write_stderr("\n");
            1
        }
    }
}

/// Run `request`, writing JSON-line messages to `out`; returns the exit code
pub fn execute<W: Write>(request: &ExecRequest, out: W) -> anyhow::Result<i32> {
    request.limits.validate()?;
    let mut sink = JsonLinesSink::new(out);

    let program = match parse_source(&request.source) {
        Ok(program) => program,
        Err(err) => {
            debug!(error = %err, "syntax error in submitted program");
            sink.send(&Message::Stdout {
                data: String::new(),
            })?;
            sink.send(&Message::Stderr {
                data: syntax_error_report(&err, &request.source),
            })?;
            sink.send(&Message::Done { steps: 0 })?;
            return Ok(1);
        }
    };

    let terminal = Terminal::new(request.stdin.as_str(), request.limits.max_output_bytes);
    let mut tracer = StepTracer::new(&request.source, &request.limits, sink);
    let mut interpreter = Interpreter::new(program, terminal).with_hook(&mut tracer);
    let result = interpreter.run();
    let mut terminal = interpreter.into_terminal();

    let exit_code = match result {
        Ok(()) => 0,
        Err(RuntimeError::Halted) => {
            debug!(trace_active = tracer.is_active(), "program halted by the tracer");
            0
        }
        Err(RuntimeError::Exception(raised)) => {
            if raised.object.kind == ExceptionKind::SystemExit {
                system_exit_code(&raised, &mut terminal)
            } else {
                let lines: Vec<&str> = request.source.lines().collect();
                terminal.write_stderr(&format_traceback(&raised, &lines));
                1
            }
        }
    };

    let steps = tracer.steps();
    let mut sink = tracer.into_sink();
    let (stdout, stderr) = terminal.into_output();
    sink.send(&Message::Stdout { data: stdout })?;
    sink.send(&Message::Stderr { data: stderr })?;
    sink.send(&Message::Done { steps })?;
    debug!(steps, exit_code, "executor finished");
    Ok(exit_code)
}

/// Executor process body: request from `input`, messages to `output`
pub fn run_executor<R: Read, W: Write>(mut input: R, output: W) -> anyhow::Result<i32> {
    let mut payload = String::new();
    input
        .read_to_string(&mut payload)
        .context("failed to read execution request")?;
    let request: ExecRequest =
        serde_json::from_str(&payload).context("malformed execution request")?;
    execute(&request, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::config::TraceLimits;
    use crate::trace::event::TraceEvent;

    fn run(source: &str, stdin: &str, limits: TraceLimits) -> (Vec<Message>, i32) {
        let request = ExecRequest {
            source: source.to_string(),
            stdin: stdin.to_string(),
            limits,
        };
        let mut out = Vec::new();
        let code = execute(&request, &mut out).unwrap();
        let messages = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (messages, code)
    }

    fn tail(messages: &[Message]) -> (&str, &str, u64) {
        match &messages[messages.len() - 3..] {
            [Message::Stdout { data: stdout }, Message::Stderr { data: stderr }, Message::Done { steps }] => {
                (stdout.as_str(), stderr.as_str(), *steps)
            }
            other => panic!("unexpected tail {:?}", other),
        }
    }

    #[test]
    fn test_normal_run() {
        let (messages, code) = run("x = 1\nx = 2\nprint(x)\n", "", TraceLimits::default());
        assert_eq!(code, 0);
        let (stdout, stderr, steps) = tail(&messages);
        assert_eq!(stdout, "2\n");
        assert_eq!(stderr, "");
        assert_eq!(steps as usize, messages.len() - 3);
    }

    #[test]
    fn test_stdin_is_redirected() {
        let (messages, _) = run("name = input()\nprint('hi', name)\n", "Ada\n", TraceLimits::default());
        assert_eq!(tail(&messages).0, "hi Ada\n");
    }

    #[test]
    fn test_uncaught_exception() {
        let (messages, code) = run("a = 1\nb = 0\nc = a / b\n", "", TraceLimits::default());
        assert_eq!(code, 1);
        let (_, stderr, _) = tail(&messages);
        assert!(stderr.starts_with("Traceback (most recent call last):\n"));
        assert!(stderr.contains("line 3, in <module>"));
        assert!(stderr.ends_with("ZeroDivisionError: division by zero\n"));
        assert!(messages.iter().any(|message| matches!(
            message,
            Message::Trace(TraceEvent::Exception { line: 3, depth: 0, .. })
        )));
    }

    #[test]
    fn test_syntax_error() {
        let (messages, code) = run("x = (1,\n", "", TraceLimits::default());
        assert_eq!(code, 1);
        assert_eq!(messages.len(), 3);
        let (_, stderr, steps) = tail(&messages);
        assert!(stderr.contains("SyntaxError: "));
        assert_eq!(steps, 0);
    }

    #[test]
    fn test_budget_still_reports_output() {
        let limits = TraceLimits {
            max_steps: 10,
            ..TraceLimits::default()
        };
        let (messages, code) = run("print('start')\nwhile True:\n    pass\n", "", limits);
        assert_eq!(code, 0);
        let trace: Vec<&Message> = messages[..messages.len() - 3].iter().collect();
        assert!(matches!(
            trace.last(),
            Some(Message::Trace(TraceEvent::BudgetExceeded { .. }))
        ));
        assert_eq!(tail(&messages).0, "start\n");
    }

    #[test]
    fn test_system_exit_codes() {
        let (_, code) = run("import sys\nsys.exit(3)\n", "", TraceLimits::default());
        assert_eq!(code, 3);
        let (_, code) = run("import sys\nsys.exit()\n", "", TraceLimits::default());
        assert_eq!(code, 0);
        let (messages, code) = run("import sys\nsys.exit('bye')\n", "", TraceLimits::default());
        assert_eq!(code, 1);
        assert_eq!(tail(&messages).1, "bye\n");
    }

    #[test]
    fn test_syntax_error_report() {
        let err = ParseError {
            message: "invalid syntax".to_string(),
            location: crate::parser::ast::SourceLocation::new(2, 7),
        };
        let report = syntax_error_report(&err, "x = 1\n  y = = 2\n");
        assert_eq!(
            report,
            "  File \"<user-code>\", line 2\n    y = = 2\n        ^\nSyntaxError: invalid syntax\n"
        );
    }
}
