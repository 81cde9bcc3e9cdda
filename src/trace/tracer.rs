//! The step tracer
//!
//! [`StepTracer`] is the interpreter [`Hook`] that turns execution into
//! [`TraceEvent`]s. It only looks at frames running the submitted program;
//! prelude frames pass through without costing a step or adding depth.
//!
//! # Budget
//!
//! Every traced event costs one step. Once the step count passes
//! `max_steps`, or the run has been going longer than the hard timeout, the
//! tracer emits a single [`TraceEvent::BudgetExceeded`], stops tracing and
//! halts the interpreter.

use crate::interpreter::hook::{Hook, HookEvent, TraceControl};
use crate::interpreter::USER_FILENAME;
use crate::memory::stack::{Stack, StackFrame};
use crate::sandbox::config::TraceLimits;
use crate::snapshot::{capture, Bindings, FrameSnapshots};
use crate::trace::diff::{diff, is_reserved};
use crate::trace::event::TraceEvent;
use crate::trace::render::{render, shorten};
use indexmap::IndexMap;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Where trace events go as they are produced
pub trait EventSink {
    fn emit(&mut self, event: TraceEvent) -> io::Result<()>;
}

impl EventSink for Vec<TraceEvent> {
    fn emit(&mut self, event: TraceEvent) -> io::Result<()> {
        self.push(event);
        Ok(())
    }
}

fn is_traced(frame: &StackFrame) -> bool {
    &*frame.filename == USER_FILENAME
}

pub struct StepTracer<S> {
    source_lines: Vec<String>,
    max_steps: u64,
    hard_timeout: Duration,
    render_limit: usize,
    sink: S,
    snapshots: FrameSnapshots,
    steps: u64,
    started: Instant,
    active: bool,
}

impl<S: EventSink> StepTracer<S> {
    pub fn new(source: &str, limits: &TraceLimits, sink: S) -> Self {
        StepTracer {
            source_lines: source.lines().map(str::to_string).collect(),
            max_steps: limits.max_steps,
            hard_timeout: limits.hard_timeout(),
            render_limit: limits.render_limit,
            sink,
            snapshots: FrameSnapshots::new(),
            steps: 0,
            started: Instant::now(),
            active: true,
        }
    }

    /// Traced events so far, including the one that exceeded the budget
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// False once the budget has run out or the sink has failed
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn source_line(&self, line: usize) -> String {
        let text = line
            .checked_sub(1)
            .and_then(|index| self.source_lines.get(index))
            .map_or("", |text| text.trim());
        shorten(text, self.render_limit)
    }

    fn render_all(&self, bindings: &Bindings) -> IndexMap<String, String> {
        bindings
            .iter()
            .filter(|(name, _)| !is_reserved(name))
            .map(|(name, value)| (name.clone(), render(value, self.render_limit)))
            .collect()
    }

    fn budget_exhausted(&self) -> Option<String> {
        if self.steps > self.max_steps {
            Some(format!("step limit of {} exceeded", self.max_steps))
        } else if self.started.elapsed() > self.hard_timeout {
            Some(format!(
                "time limit of {:.1}s exceeded",
                self.hard_timeout.as_secs_f64()
            ))
        } else {
            None
        }
    }

    /// Build the event for one hook call, updating the frame snapshots
    fn build_event(
        &mut self,
        frame: &StackFrame,
        event: HookEvent<'_>,
        depth: usize,
    ) -> TraceEvent {
        let line = frame.line;
        let source_text = self.source_line(line);
        match event {
            HookEvent::Call => {
                self.snapshots.replace(frame.id, capture(&frame.locals));
                TraceEvent::Call {
                    line,
                    source_text,
                    function_name: frame.function_name.to_string(),
                    depth,
                }
            }
            HookEvent::Line => {
                let current = capture(&frame.locals);
                let empty = Bindings::new();
                let previous = self.snapshots.get(frame.id).unwrap_or(&empty);
                let changes = diff(previous, &current);
                let limit = self.render_limit;
                let added = changes
                    .added
                    .iter()
                    .map(|(name, value)| (name.to_string(), render(value, limit)))
                    .collect();
                let updated = changes
                    .updated
                    .iter()
                    .map(|(name, old, new)| {
                        (name.to_string(), (render(old, limit), render(new, limit)))
                    })
                    .collect();
                let removed = changes.removed.iter().map(|name| name.to_string()).collect();
                let event = TraceEvent::Line {
                    line,
                    source_text,
                    depth,
                    locals: self.render_all(&current),
                    added,
                    updated,
                    removed,
                };
                self.snapshots.replace(frame.id, current);
                event
            }
            HookEvent::Return(value) => {
                self.snapshots.remove(frame.id);
                TraceEvent::Return {
                    line,
                    source_text,
                    depth,
                    function_name: frame.function_name.to_string(),
                    return_value: render(value, self.render_limit),
                }
            }
            HookEvent::Exception(exception) => TraceEvent::Exception {
                line,
                source_text,
                depth,
                error_summary: shorten(&exception.summary(), self.render_limit),
            },
        }
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.snapshots.clear();
    }
}

impl<S: EventSink> Hook for StepTracer<S> {
    fn on_event(&mut self, stack: &Stack, event: HookEvent<'_>) -> TraceControl {
        if !self.active {
            return TraceControl::Halt;
        }
        let Some(frame) = stack.current_frame() else {
            return TraceControl::Continue;
        };
        if !is_traced(frame) {
            return TraceControl::Continue;
        }

        self.steps += 1;
        let depth = stack
            .frames()
            .filter(|frame| is_traced(frame))
            .count()
            .saturating_sub(1);

        if let Some(reason) = self.budget_exhausted() {
            debug!(steps = self.steps, %reason, "trace budget exhausted");
            let event = TraceEvent::BudgetExceeded {
                line: frame.line,
                source_text: self.source_line(frame.line),
                depth,
                reason,
            };
            if let Err(err) = self.sink.emit(event) {
                warn!(error = %err, "failed to emit budget event");
            }
            self.deactivate();
            return TraceControl::Halt;
        }

        let event = self.build_event(frame, event, depth);
        match self.sink.emit(event) {
            Ok(()) => TraceControl::Continue,
            Err(err) => {
                warn!(error = %err, "event sink failed, stopping trace");
                self.deactivate();
                TraceControl::Halt
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::errors::RuntimeError;
    use crate::interpreter::terminal::Terminal;
    use crate::interpreter::Interpreter;
    use crate::parser::parse_source;

    fn trace_with(source: &str, limits: TraceLimits) -> (Vec<TraceEvent>, Result<(), RuntimeError>) {
        let program = parse_source(source).unwrap();
        let mut tracer = StepTracer::new(source, &limits, Vec::new());
        let result = Interpreter::new(program, Terminal::new("", 1 << 16))
            .with_hook(&mut tracer)
            .run();
        (tracer.into_sink(), result)
    }

    fn trace(source: &str) -> Vec<TraceEvent> {
        let (events, result) = trace_with(source, TraceLimits::default());
        result.unwrap();
        events
    }

    #[test]
    fn test_module_call_and_return() {
        let events = trace("x = 1\n");
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], TraceEvent::Call { function_name, depth: 0, .. } if function_name == "<module>"));
        assert!(matches!(&events[1], TraceEvent::Line { line: 1, .. }));
        assert!(matches!(&events[2], TraceEvent::Return { return_value, .. } if return_value == "None"));
    }

    #[test]
    fn test_update_diff() {
        let events = trace("x = 1\nx = 2\nprint(x)\n");
        let lines: Vec<&TraceEvent> = events
            .iter()
            .filter(|event| matches!(event, TraceEvent::Line { .. }))
            .collect();
        assert_eq!(lines.len(), 3);

        let TraceEvent::Line { added, .. } = lines[1] else {
            unreachable!()
        };
        assert_eq!(added["x"], "1");

        let TraceEvent::Line {
            updated, locals, ..
        } = lines[2]
        else {
            unreachable!()
        };
        assert_eq!(updated["x"], ("1".to_string(), "2".to_string()));
        assert_eq!(locals["x"], "2");
        assert!(!locals.contains_key("__name__"));
    }

    #[test]
    fn test_function_depth() {
        let source = "def f(n):\n    return n + 1\n\ny = f(1)\n";
        let events = trace(source);
        let call = events
            .iter()
            .find(|event| matches!(event, TraceEvent::Call { function_name, .. } if function_name == "f"))
            .unwrap();
        assert_eq!(call.depth(), 1);
        assert_eq!(call.line(), 1);
        assert_eq!(call.source_text(), "def f(n):");

        let ret = events
            .iter()
            .find(|event| matches!(event, TraceEvent::Return { function_name, .. } if function_name == "f"))
            .unwrap();
        assert_eq!(ret.depth(), 1);
        assert!(matches!(ret, TraceEvent::Return { return_value, .. } if return_value == "2"));
    }

    #[test]
    fn test_prelude_frames_are_invisible() {
        let events = trace("items = list(map(lambda v: v * 2, [1, 2]))\n");
        assert!(events
            .iter()
            .all(|event| !matches!(event, TraceEvent::Call { function_name, .. } if function_name == "map")));
        let lambda_calls: Vec<&TraceEvent> = events
            .iter()
            .filter(|event| matches!(event, TraceEvent::Call { function_name, .. } if function_name == "<lambda>"))
            .collect();
        assert_eq!(lambda_calls.len(), 2);
        assert!(lambda_calls.iter().all(|event| event.depth() == 1));
    }

    #[test]
    fn test_exception_event() {
        let (events, result) = trace_with("a = 1\nb = 0\nc = a / b\n", TraceLimits::default());
        assert!(result.is_err());
        let exception = events
            .iter()
            .find(|event| matches!(event, TraceEvent::Exception { .. }))
            .unwrap();
        assert_eq!(exception.line(), 3);
        assert_eq!(exception.depth(), 0);
        assert!(matches!(exception, TraceEvent::Exception { error_summary, .. }
            if error_summary == "ZeroDivisionError: division by zero"));
    }

    #[test]
    fn test_step_budget() {
        let limits = TraceLimits {
            max_steps: 10,
            ..TraceLimits::default()
        };
        let (events, result) = trace_with("while True:\n    pass\n", limits);
        assert!(matches!(result, Err(RuntimeError::Halted)));
        assert_eq!(events.len(), 11);
        assert_eq!(events.iter().filter(|event| event.is_budget_exceeded()).count(), 1);
        assert!(events.last().unwrap().is_budget_exceeded());
    }
}
