//! Instrumentation hook interface
//!
//! The interpreter reports execution to an optional [`Hook`] at four points:
//! frame entry, before each line, frame exit and when an exception passes
//! through a frame. The hook sees the whole call stack and decides whether
//! execution continues.

use crate::interpreter::errors::ExceptionObject;
use crate::memory::stack::Stack;
use crate::memory::value::Value;

/// What the interpreter is about to do (or just did) in the current frame
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    /// A frame was entered; arguments are already bound
    Call,
    /// A line is about to execute
    Line,
    /// The frame is returning; `None` when an exception is leaving it
    Return(&'a Value),
    /// An exception was raised in, or propagated into, the frame
    Exception(&'a ExceptionObject),
}

impl HookEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::Call => "call",
            HookEvent::Line => "line",
            HookEvent::Return(_) => "return",
            HookEvent::Exception(_) => "exception",
        }
    }
}

/// Hook verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceControl {
    Continue,
    /// Stop the program; the interpreter unwinds with `RuntimeError::Halted`
    Halt,
}

pub trait Hook {
    fn on_event(&mut self, stack: &Stack, event: HookEvent<'_>) -> TraceControl;
}
