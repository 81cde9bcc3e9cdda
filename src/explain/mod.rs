//! Per-event explanations from an external collaborator
//!
//! An [`Explainer`] turns one trace event into a short sentence. It is
//! optional and allowed to fail: [`annotate`] replaces any failure with
//! [`NO_EXPLANATION`] and carries on with the next event.

use crate::trace::event::TraceEvent;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Placeholder used when the explainer fails
pub const NO_EXPLANATION: &str = "(no explanation available)";

/// How long one explain command may run before it is killed
pub const DEFAULT_EXPLAIN_TIMEOUT: Duration = Duration::from_secs(10);

const EXIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("failed to run explainer: {0}")]
    Io(#[from] io::Error),

    #[error("explainer exited with {0}")]
    Status(ExitStatus),

    #[error("explainer returned no text")]
    Empty,

    #[error("explainer did not finish within {0:?}")]
    Timeout(Duration),
}

/// Which events are sent to the explainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplainMode {
    /// Calls, returns, exceptions and lines that changed a binding
    #[default]
    OnlyChanges,
    All,
}

impl ExplainMode {
    pub fn wants(&self, event: &TraceEvent) -> bool {
        match self {
            ExplainMode::All => true,
            ExplainMode::OnlyChanges => match event {
                TraceEvent::Call { .. } | TraceEvent::Return { .. } | TraceEvent::Exception { .. } => true,
                TraceEvent::Line { .. } => event.has_changes(),
                TraceEvent::BudgetExceeded { .. } => false,
            },
        }
    }
}

/// The fields of one event an explainer gets to see
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainRequest {
    pub event: &'static str,
    pub depth: usize,
    pub code_line: String,
    /// `{ name=value, ... }`
    pub locals: String,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub error: Option<String>,
}

fn name_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
    format!("[{}]", quoted.join(", "))
}

impl ExplainRequest {
    pub fn from_event(event: &TraceEvent) -> Self {
        let mut request = ExplainRequest {
            event: event.tag(),
            depth: event.depth(),
            code_line: event.source_text().to_string(),
            locals: "{  }".to_string(),
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            error: None,
        };
        match event {
            TraceEvent::Line {
                locals,
                added,
                updated,
                removed,
                ..
            } => {
                let pairs: Vec<String> = locals
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                request.locals = format!("{{ {} }}", pairs.join(", "));
                request.added = added.keys().cloned().collect();
                request.updated = updated.keys().cloned().collect();
                request.removed = removed.clone();
            }
            TraceEvent::Exception { error_summary, .. } => {
                request.error = Some(error_summary.clone());
            }
            TraceEvent::BudgetExceeded { reason, .. } => request.error = Some(reason.clone()),
            TraceEvent::Call { .. } | TraceEvent::Return { .. } => {}
        }
        request
    }

    /// Compact prompt text
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "Event: {}\nDepth: {}\nLine: {}\nLocals: {}\nAdded: {}; Updated: {}; Removed: {}\n",
            self.event,
            self.depth,
            self.code_line,
            self.locals,
            name_list(&self.added),
            name_list(&self.updated),
            name_list(&self.removed),
        );
        if let Some(error) = &self.error {
            prompt.push_str(&format!("Error: {}\n", error));
        }
        prompt.push_str("Explain briefly.");
        prompt
    }
}

pub trait Explainer {
    fn explain(&self, request: &ExplainRequest) -> Result<String, ExplainError>;
}

/// Pipes each prompt into an external command and reads the answer from
/// its stdout; a command still running after `timeout` is killed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExplainer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExplainer {
    /// Split a command line on whitespace; `None` when it is empty
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(CommandExplainer {
            program,
            args: words.collect(),
            timeout: DEFAULT_EXPLAIN_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn stop(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(error = %err, "failed to kill explainer");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "failed to reap explainer");
    }
}

impl Explainer for CommandExplainer {
    fn explain(&self, request: &ExplainRequest) -> Result<String, ExplainError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(request.prompt().as_bytes()) {
                stop(&mut child);
                return Err(err.into());
            }
        }

        let (sender, receiver) = crossbeam_channel::bounded(1);
        if let Some(mut stdout) = child.stdout.take() {
            let reader = thread::Builder::new()
                .name("explainer-reader".to_string())
                .spawn(move || {
                    let mut text = String::new();
                    let read = stdout.read_to_string(&mut text).map(|_| text);
                    // The receiver is gone once the command timed out
                    let _ = sender.send(read);
                });
            if let Err(err) = reader {
                stop(&mut child);
                return Err(err.into());
            }
        }

        let text = match receiver.recv_deadline(deadline) {
            Ok(read) => read?,
            Err(_) => {
                stop(&mut child);
                return Err(ExplainError::Timeout(self.timeout));
            }
        };
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                stop(&mut child);
                return Err(ExplainError::Timeout(self.timeout));
            }
            thread::sleep(EXIT_POLL);
        };
        if !status.success() {
            return Err(ExplainError::Status(status));
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ExplainError::Empty);
        }
        Ok(text)
    }
}

/// A trace event with its optional explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedEvent<'a> {
    #[serde(flatten)]
    pub event: &'a TraceEvent,
    pub explanation: Option<String>,
}

/// Pair every event with an explanation when `mode` selects it
pub fn annotate<'a>(
    events: &'a [TraceEvent],
    explainer: Option<&dyn Explainer>,
    mode: ExplainMode,
) -> Vec<AnnotatedEvent<'a>> {
    events
        .iter()
        .map(|event| {
            let explanation = explainer
                .filter(|_| mode.wants(event))
                .map(|explainer| match explainer.explain(&ExplainRequest::from_event(event)) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, line = event.line(), "explanation failed");
                        NO_EXPLANATION.to_string()
                    }
                });
            AnnotatedEvent { event, explanation }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::cell::Cell;

    fn line_event(changed: bool) -> TraceEvent {
        let mut added = IndexMap::new();
        if changed {
            added.insert("x".to_string(), "1".to_string());
        }
        TraceEvent::Line {
            line: 2,
            source_text: "x = 1".to_string(),
            depth: 0,
            locals: IndexMap::from([
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "'a'".to_string()),
            ]),
            added,
            updated: IndexMap::new(),
            removed: Vec::new(),
        }
    }

    struct Counting {
        calls: Cell<usize>,
        fail: bool,
    }

    impl Explainer for Counting {
        fn explain(&self, request: &ExplainRequest) -> Result<String, ExplainError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(ExplainError::Empty)
            } else {
                Ok(format!("{} at depth {}", request.event, request.depth))
            }
        }
    }

    #[test]
    fn test_prompt() {
        let request = ExplainRequest::from_event(&line_event(true));
        assert_eq!(request.locals, "{ x=1, y='a' }");
        assert_eq!(
            request.prompt(),
            "Event: line\nDepth: 0\nLine: x = 1\nLocals: { x=1, y='a' }\nAdded: ['x']; Updated: []; Removed: []\nExplain briefly."
        );

        let exception = TraceEvent::Exception {
            line: 3,
            source_text: "c = a / b".to_string(),
            depth: 1,
            error_summary: "ZeroDivisionError: division by zero".to_string(),
        };
        let prompt = ExplainRequest::from_event(&exception).prompt();
        assert!(prompt.contains("Error: ZeroDivisionError: division by zero\n"));
        assert!(prompt.contains("Locals: {  }\n"));
    }

    #[test]
    fn test_only_changes_mode() {
        let events = vec![line_event(false), line_event(true)];
        let explainer = Counting {
            calls: Cell::new(0),
            fail: false,
        };
        let annotated = annotate(&events, Some(&explainer), ExplainMode::OnlyChanges);
        assert_eq!(explainer.calls.get(), 1);
        assert_eq!(annotated[0].explanation, None);
        assert_eq!(annotated[1].explanation.as_deref(), Some("line at depth 0"));

        annotate(&events, Some(&explainer), ExplainMode::All);
        assert_eq!(explainer.calls.get(), 3);
    }

    #[test]
    fn test_failures_degrade() {
        let events = vec![line_event(true)];
        let explainer = Counting {
            calls: Cell::new(0),
            fail: true,
        };
        let annotated = annotate(&events, Some(&explainer), ExplainMode::All);
        assert_eq!(annotated[0].explanation.as_deref(), Some(NO_EXPLANATION));

        let annotated = annotate(&events, None, ExplainMode::All);
        assert_eq!(annotated[0].explanation, None);
    }

    #[test]
    fn test_command_line() {
        assert_eq!(CommandExplainer::from_command_line("   "), None);
        let explainer = CommandExplainer::from_command_line("explain --short").unwrap();
        assert_eq!(explainer.program, "explain");
        assert_eq!(explainer.args, ["--short"]);
        assert_eq!(explainer.timeout, DEFAULT_EXPLAIN_TIMEOUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_explainer() {
        let explainer = CommandExplainer::from_command_line("head -n 1").unwrap();
        let request = ExplainRequest::from_event(&line_event(true));
        assert_eq!(explainer.explain(&request).unwrap(), "Event: line");

        let missing = CommandExplainer::from_command_line("/nonexistent/explainer").unwrap();
        assert!(matches!(missing.explain(&request), Err(ExplainError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_times_out() {
        let explainer = CommandExplainer::from_command_line("sleep 30")
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let request = ExplainRequest::from_event(&line_event(true));
        assert!(matches!(explainer.explain(&request), Err(ExplainError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(10));

        let events = vec![line_event(true)];
        let annotated = annotate(&events, Some(&explainer), ExplainMode::All);
        assert_eq!(annotated[0].explanation.as_deref(), Some(NO_EXPLANATION));
    }
}
