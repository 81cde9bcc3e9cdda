//! The orchestrator
//!
//! [`Orchestrator::run`] starts one fresh executor process per call, feeds
//! it the request, and drains its message stream from a reader thread
//! through a channel until the process has exited and the stream is empty.
//!
//! # Deadlines
//!
//! The tracer's budget check only runs between traced events, so a program
//! stuck in an uninstrumented call (`time.sleep`) can overrun it. When
//! [`SandboxConfig::kill_grace`] is set, the executor is killed once
//! `hard_timeout + kill_grace` has passed; a killed run counts as crashed.

use crate::sandbox::config::{ConfigError, SandboxConfig, TraceLimits};
use crate::sandbox::protocol::{ExecRequest, Message};
use crate::trace::event::TraceEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Faults of the orchestrator itself; program failures are never errors
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid limits: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn executor `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("executor {0} pipe was not captured")]
    MissingPipe(&'static str),

    #[error("failed to encode execution request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for executor: {0}")]
    Wait(#[source] io::Error),
}

/// Everything one run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Trace events in production order
    pub events: Vec<TraceEvent>,
    pub stdout: String,
    pub stderr: String,
    /// A `BudgetExceeded` event was observed
    pub timed_out: bool,
    /// The executor died from a crash signal or was killed
    pub crashed: bool,
    /// The orchestrator killed the executor at the hard deadline
    pub killed: bool,
    /// The `done` marker arrived
    pub completed: bool,
    /// Exit code, or the negated signal number
    pub exit_status: Option<i32>,
    /// Signal that terminated the executor
    pub signal: Option<i32>,
    /// Step count reported by the executor
    pub steps: u64,
    pub duration_ms: u64,
}

impl RunResult {
    fn absorb(&mut self, message: Message) {
        match message {
            Message::Trace(event) => {
                if event.is_budget_exceeded() {
                    self.timed_out = true;
                }
                self.events.push(event);
            }
            Message::Stdout { data } => self.stdout = data,
            Message::Stderr { data } => self.stderr = data,
            Message::Done { steps } => {
                self.completed = true;
                self.steps = steps;
            }
        }
    }

    /// Compact summary of the run
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            events_count: self.events.len(),
            stdout: &self.stdout,
            stderr: &self.stderr,
            timed_out: self.timed_out,
            crashed: self.crashed,
            exit_status: self.exit_status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary<'a> {
    pub events_count: usize,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub timed_out: bool,
    pub crashed: bool,
    pub exit_status: Option<i32>,
}

/// Signals that mean the executor crashed rather than exited
#[cfg(unix)]
const CRASH_SIGNALS: &[i32] = &[
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGFPE,
    libc::SIGABRT,
    libc::SIGSYS,
    libc::SIGTRAP,
    libc::SIGKILL,
];

/// `(exit_status, signal)` of a finished process
#[cfg(unix)]
fn exit_details(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    let signal = status.signal();
    (status.code().or(signal.map(|signal| -signal)), signal)
}

#[cfg(not(unix))]
fn exit_details(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

#[cfg(unix)]
fn is_crash_signal(signal: i32) -> bool {
    CRASH_SIGNALS.contains(&signal)
}

#[cfg(not(unix))]
fn is_crash_signal(_signal: i32) -> bool {
    false
}

/// Reader thread: parse JSON lines from the executor's stdout
fn read_messages<R: Read>(stdout: R, sender: Sender<Message>) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "executor stream failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(&line) {
            Ok(message) => {
                trace!(kind = message.kind(), "executor message");
                if sender.send(message).is_err() {
                    break;
                }
            }
            Err(err) => warn!(error = %err, "skipping malformed executor message"),
        }
    }
}

/// Diagnostics thread: re-log whatever the executor writes to stderr
fn relay_diagnostics<R: Read>(stderr: R) {
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        debug!(target: "steptrace::executor", "{}", line);
    }
}

fn spawn_thread<F>(name: &'static str, body: F) -> Result<(), SandboxError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(drop)
        .map_err(|source| SandboxError::Thread { name, source })
}

/// Spawns and supervises executor processes
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: SandboxConfig,
}

impl Orchestrator {
    pub fn new(config: SandboxConfig) -> Self {
        Orchestrator { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Trace `source` with the given step and time budget
    pub fn run(
        &self,
        source: &str,
        stdin: &str,
        max_steps: u64,
        hard_timeout_secs: f64,
    ) -> Result<RunResult, SandboxError> {
        let limits = TraceLimits {
            max_steps,
            hard_timeout_secs,
            ..TraceLimits::default()
        };
        self.run_request(&ExecRequest {
            source: source.to_string(),
            stdin: stdin.to_string(),
            limits,
        })
    }

    /// Run one request in a fresh executor process
    pub fn run_request(&self, request: &ExecRequest) -> Result<RunResult, SandboxError> {
        request.limits.validate()?;
        let payload = serde_json::to_vec(request)?;
        let started = Instant::now();

        let executor = &self.config.executor;
        let mut command = Command::new(&executor.program);
        command
            .args(&executor.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            // Own process group: signals aimed at the executor's group never
            // reach the caller.
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                program: executor.program.display().to_string(),
                source,
            })?;
        debug!(pid = child.id(), "spawned executor");

        let stdout = child.stdout.take().ok_or(SandboxError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SandboxError::MissingPipe("stderr"))?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        spawn_thread("executor-reader", move || read_messages(stdout, sender))?;
        spawn_thread("executor-diagnostics", move || relay_diagnostics(stderr))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that dies at once closes the pipe early; its exit
            // status tells the rest.
            if let Err(err) = stdin.write_all(&payload) {
                warn!(error = %err, "failed to send request to executor");
            }
        }

        let deadline = self.config.kill_grace.and_then(|grace| {
            started.checked_add(request.limits.hard_timeout().saturating_add(grace))
        });
        let mut result = RunResult::default();
        let status = self.supervise(&mut child, &receiver, deadline, &mut result)?;

        let (exit_status, signal) = exit_details(status);
        result.exit_status = exit_status;
        result.signal = signal;
        result.crashed = result.killed || signal.is_some_and(is_crash_signal);
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            events = result.events.len(),
            steps = result.steps,
            timed_out = result.timed_out,
            crashed = result.crashed,
            exit_status = ?result.exit_status,
            duration_ms = result.duration_ms,
            "run finished"
        );
        Ok(result)
    }

    /// Drain messages until the executor has exited and the stream is empty
    fn supervise(
        &self,
        child: &mut Child,
        receiver: &Receiver<Message>,
        deadline: Option<Instant>,
        result: &mut RunResult,
    ) -> Result<ExitStatus, SandboxError> {
        loop {
            match receiver.recv_timeout(self.config.poll_interval) {
                Ok(message) => result.absorb(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return self.wait_for_exit(child, deadline, result);
                }
            }

            if let Some(status) = child.try_wait().map_err(SandboxError::Wait)? {
                let drain_until = Instant::now() + self.config.drain_timeout;
                while let Ok(message) = receiver.recv_deadline(drain_until) {
                    result.absorb(message);
                }
                return Ok(status);
            }
            self.enforce_deadline(child, deadline, result);
        }
    }

    /// The stream has ended; wait for the process itself
    fn wait_for_exit(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
        result: &mut RunResult,
    ) -> Result<ExitStatus, SandboxError> {
        loop {
            if let Some(status) = child.try_wait().map_err(SandboxError::Wait)? {
                return Ok(status);
            }
            self.enforce_deadline(child, deadline, result);
            thread::sleep(self.config.poll_interval.min(Duration::from_millis(10)));
        }
    }

    fn enforce_deadline(&self, child: &mut Child, deadline: Option<Instant>, result: &mut RunResult) {
        let Some(deadline) = deadline else {
            return;
        };
        if result.killed || Instant::now() < deadline {
            return;
        }
        warn!(pid = child.id(), "executor overran the hard deadline, killing it");
        match child.kill() {
            Ok(()) => result.killed = true,
            Err(err) => warn!(error = %err, "failed to kill executor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_message(line: usize, budget: bool) -> Message {
        Message::Trace(if budget {
            TraceEvent::BudgetExceeded {
                line,
                source_text: String::new(),
                depth: 0,
                reason: "step limit of 1 exceeded".to_string(),
            }
        } else {
            TraceEvent::Call {
                line,
                source_text: String::new(),
                function_name: "<module>".to_string(),
                depth: 0,
            }
        })
    }

    #[test]
    fn test_absorb_separates_output() {
        let mut result = RunResult::default();
        result.absorb(trace_message(1, false));
        result.absorb(trace_message(2, true));
        result.absorb(Message::Stdout {
            data: "out".to_string(),
        });
        result.absorb(Message::Stderr {
            data: "err".to_string(),
        });
        result.absorb(Message::Done { steps: 2 });

        assert_eq!(result.events.len(), 2);
        assert!(result.timed_out);
        assert!(result.completed);
        assert_eq!(result.steps, 2);
        assert_eq!(result.stdout, "out");

        let summary = result.summary();
        assert_eq!(summary.events_count, 2);
        assert_eq!(summary.stderr, "err");
    }

    #[test]
    fn test_reader_skips_malformed_lines() {
        let input = "{\"kind\":\"done\",\"steps\":3}\nnot json\n\n{\"kind\":\"stdout\",\"data\":\"x\"}\n";
        let (sender, receiver) = crossbeam_channel::unbounded();
        read_messages(input.as_bytes(), sender);
        let messages: Vec<Message> = receiver.iter().collect();
        assert_eq!(
            messages,
            [
                Message::Done { steps: 3 },
                Message::Stdout {
                    data: "x".to_string()
                }
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_crash_signals() {
        assert!(is_crash_signal(libc::SIGSEGV));
        assert!(is_crash_signal(libc::SIGABRT));
        assert!(!is_crash_signal(libc::SIGTERM));
    }

    #[test]
    fn test_spawn_failure_is_an_error() {
        let config = SandboxConfig::new(crate::sandbox::config::ExecutorCommand::steptrace(
            "/nonexistent/steptrace-executor",
        ));
        let err = Orchestrator::new(config).run("x = 1", "", 10, 1.0).unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[test]
    fn test_invalid_limits_are_rejected() {
        let config = SandboxConfig::new(crate::sandbox::config::ExecutorCommand::steptrace("steptrace"));
        let err = Orchestrator::new(config).run("x = 1", "", 0, 1.0).unwrap_err();
        assert!(matches!(err, SandboxError::Config(ConfigError::ZeroSteps)));
    }
}
