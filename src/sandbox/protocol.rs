//! Executor wire protocol
//!
//! The orchestrator writes one JSON [`ExecRequest`] to the executor's stdin
//! and closes it. The executor answers on its stdout with one JSON
//! [`Message`] per line:
//!
//! ```text
//! {"kind":"trace","type":"call","line":1,...}
//! {"kind":"trace","type":"line","line":1,...}
//! ...
//! {"kind":"stdout","data":"2\n"}
//! {"kind":"stderr","data":""}
//! {"kind":"done","steps":7}
//! ```
//!
//! `stdout`, `stderr` and `done` are always the last three messages, in that
//! order, unless the executor dies first.

use crate::sandbox::config::TraceLimits;
use crate::trace::event::TraceEvent;
use crate::trace::tracer::EventSink;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Program to run, sent to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub source: String,
    #[serde(default)]
    pub stdin: String,
    #[serde(default)]
    pub limits: TraceLimits,
}

/// One line of executor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Trace(TraceEvent),
    Stdout { data: String },
    Stderr { data: String },
    /// Completion marker with the number of traced steps
    Done { steps: u64 },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Trace(_) => "trace",
            Message::Stdout { .. } => "stdout",
            Message::Stderr { .. } => "stderr",
            Message::Done { .. } => "done",
        }
    }
}

/// Writes messages as JSON lines, flushing after each one
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }

    pub fn send(&mut self, message: &Message) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: TraceEvent) -> io::Result<()> {
        self.send(&Message::Trace(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(TraceEvent::Exception {
            line: 3,
            source_text: "c = a / b".to_string(),
            depth: 0,
            error_summary: "ZeroDivisionError: division by zero".to_string(),
        })
        .unwrap();
        sink.send(&Message::Done { steps: 4 }).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "trace");
        assert_eq!(first["type"], "exception");
        assert_eq!(first["line"], 3);

        let message: Message = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(message.kind(), "trace");
        assert!(matches!(message, Message::Trace(TraceEvent::Exception { line: 3, .. })));
        assert_eq!(
            serde_json::from_str::<Message>(lines[1]).unwrap(),
            Message::Done { steps: 4 }
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: ExecRequest = serde_json::from_str(r#"{"source": "x = 1"}"#).unwrap();
        assert_eq!(request.stdin, "");
        assert_eq!(request.limits, TraceLimits::default());
    }
}
