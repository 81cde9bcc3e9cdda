//! Call stack implementation
//!
//! This module provides the call stack for function execution:
//! - [`Stack`]: The call stack containing frames
//! - [`StackFrame`]: A single function's activation record
//! - [`FrameId`]: Identity of one activation, never reused within a run
//!
//! The module-level frame is always at the bottom. Its `locals` and
//! `globals` are the same namespace.

use super::value::Namespace;
use crate::parser::ast::FunctionDef;
use std::fmt;
use std::rc::Rc;

/// Unique identity of a stack frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stack frame for a function call (or the module body)
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub id: FrameId,
    pub function_name: Rc<str>,
    pub filename: Rc<str>,
    /// Line currently executing in this frame
    pub line: usize,
    pub locals: Namespace,
    pub globals: Namespace,
    /// `None` for module frames
    pub code: Option<Rc<FunctionDef>>,
    /// Enclosing function namespaces, innermost first
    pub closure: Vec<Namespace>,
}

impl StackFrame {
    pub fn is_module(&self) -> bool {
        self.code.is_none()
    }
}

/// Parameters for a new frame; the stack assigns the id
#[derive(Debug, Clone)]
pub struct FrameSpec {
    pub function_name: Rc<str>,
    pub filename: Rc<str>,
    pub line: usize,
    pub locals: Namespace,
    pub globals: Namespace,
    pub code: Option<Rc<FunctionDef>>,
    pub closure: Vec<Namespace>,
}

/// The call stack
#[derive(Debug, Default)]
pub struct Stack {
    frames: Vec<StackFrame>,
    next_id: u64,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new frame and return its id
    pub fn push_frame(&mut self, spec: FrameSpec) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.frames.push(StackFrame {
            id,
            function_name: spec.function_name,
            filename: spec.filename,
            line: spec.line,
            locals: spec.locals,
            globals: spec.globals,
            code: spec.code,
            closure: spec.closure,
        });
        id
    }

    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames from the bottom (module) to the top (current)
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = &StackFrame> {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::value::new_namespace;

    fn spec(name: &str) -> FrameSpec {
        let globals = new_namespace();
        FrameSpec {
            function_name: name.into(),
            filename: "<user-code>".into(),
            line: 1,
            locals: globals.clone(),
            globals,
            code: None,
            closure: Vec::new(),
        }
    }

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        assert!(stack.is_empty());

        let first = stack.push_frame(spec("<module>"));
        let second = stack.push_frame(spec("f"));
        assert_ne!(first, second);
        assert_eq!(stack.depth(), 2);
        assert_eq!(&*stack.current_frame().unwrap().function_name, "f");

        stack.pop_frame();
        assert_eq!(stack.current_frame().unwrap().id, first);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut stack = Stack::new();
        let a = stack.push_frame(spec("f"));
        stack.pop_frame();
        let b = stack.push_frame(spec("f"));
        assert_ne!(a, b);
    }
}
