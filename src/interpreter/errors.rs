//! Runtime error types for the interpreter
//!
//! This module defines [`RuntimeError`], which represents everything that can
//! interrupt normal statement execution (as opposed to parse errors or system
//! errors):
//!
//! - [`RuntimeError::Exception`]: an exception raised by (or inside) the traced
//!   program; catchable by `try`/`except` and reported to the trace hook
//! - [`RuntimeError::Halted`]: the trace hook asked execution to stop; never
//!   catchable, unwinds straight to the top
//!
//! Exception classes form the usual hierarchy rooted at `BaseException`; see
//! [`ExceptionKind::parent`].

use crate::memory::repr::{repr_string, str_string};
use crate::memory::stack::FrameId;
use crate::memory::value::{Value, ValueError};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Built-in exception classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    BaseException,
    SystemExit,
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    IndexError,
    KeyError,
    ValueError,
    TypeError,
    NameError,
    UnboundLocalError,
    AttributeError,
    RuntimeError,
    RecursionError,
    NotImplementedError,
    AssertionError,
    StopIteration,
    EOFError,
    ImportError,
    ModuleNotFoundError,
    MemoryError,
    OSError,
    SyntaxError,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 25] = [
        ExceptionKind::BaseException,
        ExceptionKind::SystemExit,
        ExceptionKind::Exception,
        ExceptionKind::ArithmeticError,
        ExceptionKind::ZeroDivisionError,
        ExceptionKind::OverflowError,
        ExceptionKind::LookupError,
        ExceptionKind::IndexError,
        ExceptionKind::KeyError,
        ExceptionKind::ValueError,
        ExceptionKind::TypeError,
        ExceptionKind::NameError,
        ExceptionKind::UnboundLocalError,
        ExceptionKind::AttributeError,
        ExceptionKind::RuntimeError,
        ExceptionKind::RecursionError,
        ExceptionKind::NotImplementedError,
        ExceptionKind::AssertionError,
        ExceptionKind::StopIteration,
        ExceptionKind::EOFError,
        ExceptionKind::ImportError,
        ExceptionKind::ModuleNotFoundError,
        ExceptionKind::MemoryError,
        ExceptionKind::OSError,
        ExceptionKind::SyntaxError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::BaseException => "BaseException",
            ExceptionKind::SystemExit => "SystemExit",
            ExceptionKind::Exception => "Exception",
            ExceptionKind::ArithmeticError => "ArithmeticError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::LookupError => "LookupError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::UnboundLocalError => "UnboundLocalError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::NotImplementedError => "NotImplementedError",
            ExceptionKind::AssertionError => "AssertionError",
            ExceptionKind::StopIteration => "StopIteration",
            ExceptionKind::EOFError => "EOFError",
            ExceptionKind::ImportError => "ImportError",
            ExceptionKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExceptionKind::MemoryError => "MemoryError",
            ExceptionKind::OSError => "OSError",
            ExceptionKind::SyntaxError => "SyntaxError",
        }
    }

    /// Direct base class; `None` only for `BaseException`
    pub fn parent(&self) -> Option<ExceptionKind> {
        use ExceptionKind::*;
        match self {
            BaseException => None,
            SystemExit | Exception => Some(BaseException),
            ZeroDivisionError | OverflowError => Some(ArithmeticError),
            IndexError | KeyError => Some(LookupError),
            UnboundLocalError => Some(NameError),
            RecursionError | NotImplementedError => Some(RuntimeError),
            ModuleNotFoundError => Some(ImportError),
            ArithmeticError | LookupError | ValueError | TypeError | NameError
            | AttributeError | RuntimeError | AssertionError | StopIteration | EOFError
            | ImportError | MemoryError | OSError | SyntaxError => Some(Exception),
        }
    }

    /// Whether `self` is `other` or derives from it
    pub fn is_subclass_of(&self, other: ExceptionKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    pub fn from_name(name: &str) -> Option<ExceptionKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

/// An exception instance
#[derive(Debug, Clone)]
pub struct ExceptionObject {
    pub kind: ExceptionKind,
    pub args: Vec<Value>,
}

impl ExceptionObject {
    pub fn new(kind: ExceptionKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }

    /// `str(exc)`: empty, the single argument, or the argument tuple
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [arg] if self.kind == ExceptionKind::KeyError => repr_string(arg),
            [arg] => str_string(arg),
            args => repr_string(&Value::tuple(args.to_vec())),
        }
    }

    /// `"Kind: message"`, or just the kind when the message is empty
    pub fn summary(&self) -> String {
        let message = self.message();
        if message.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{}: {}", self.kind.name(), message)
        }
    }
}

impl fmt::Display for ExceptionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// One line of a Python-style traceback
#[derive(Debug, Clone)]
pub struct TracebackEntry {
    pub filename: Rc<str>,
    pub line: usize,
    pub function_name: Rc<str>,
}

/// An exception in flight, with the frames it has unwound through
#[derive(Debug, Clone)]
pub struct RaisedException {
    pub object: Rc<ExceptionObject>,
    /// Frame that already fired the exception hook for this raise
    pub reported_in: Option<FrameId>,
    /// Outermost frame first
    pub traceback: Vec<TracebackEntry>,
}

/// Errors that interrupt execution
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("{}", .0.object)]
    Exception(Box<RaisedException>),

    #[error("execution halted by the trace hook")]
    Halted,
}

impl RuntimeError {
    /// Raise a new exception of `kind` with a single message argument
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self::from_object(ExceptionObject::new(kind, vec![Value::str(message.into())]))
    }

    pub fn from_object(object: ExceptionObject) -> Self {
        Self::from_shared(Rc::new(object))
    }

    /// Re-raise an existing exception instance (`raise e`)
    pub fn from_shared(object: Rc<ExceptionObject>) -> Self {
        RuntimeError::Exception(Box::new(RaisedException {
            object,
            reported_in: None,
            traceback: Vec::new(),
        }))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IndexError, message)
    }

    pub fn key_error(key: Value) -> Self {
        Self::from_object(ExceptionObject::new(ExceptionKind::KeyError, vec![key]))
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        )
    }

    pub fn attribute_error(type_name: &str, attribute: &str) -> Self {
        Self::new(
            ExceptionKind::AttributeError,
            format!("'{}' object has no attribute '{}'", type_name, attribute),
        )
    }

    pub fn zero_division(message: &str) -> Self {
        Self::new(ExceptionKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(
            ExceptionKind::OverflowError,
            "integer result out of 64-bit range",
        )
    }

    pub fn memory_error() -> Self {
        Self::from_object(ExceptionObject::new(ExceptionKind::MemoryError, Vec::new()))
    }

    pub fn recursion_error() -> Self {
        Self::new(
            ExceptionKind::RecursionError,
            "maximum recursion depth exceeded",
        )
    }

    /// The exception instance, if this is an exception
    pub fn exception(&self) -> Option<&Rc<ExceptionObject>> {
        match self {
            RuntimeError::Exception(raised) => Some(&raised.object),
            RuntimeError::Halted => None,
        }
    }

    pub fn is_kind(&self, kind: ExceptionKind) -> bool {
        self.exception()
            .is_some_and(|object| object.kind.is_subclass_of(kind))
    }
}

impl From<ValueError> for RuntimeError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::TooDeep => Self::new(ExceptionKind::RecursionError, err.to_string()),
            ValueError::Unhashable(_) => Self::type_error(err.to_string()),
            ValueError::Busy(_) => Self::new(ExceptionKind::RuntimeError, err.to_string()),
        }
    }
}

/// Format an uncaught exception as a `Traceback (most recent call last)` report
pub fn format_traceback(raised: &RaisedException, source_lines: &[&str]) -> String {
    let mut out = String::from("Traceback (most recent call last):\n");
    for entry in &raised.traceback {
        out.push_str(&format!(
            "  File \"{}\", line {}, in {}\n",
            entry.filename, entry.line, entry.function_name
        ));
        if let Some(text) = entry
            .line
            .checked_sub(1)
            .and_then(|index| source_lines.get(index))
        {
            let text = text.trim();
            if !text.is_empty() {
                out.push_str(&format!("    {}\n", text));
            }
        }
    }
    out.push_str(&raised.object.summary());
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(ExceptionKind::ZeroDivisionError.is_subclass_of(ExceptionKind::ArithmeticError));
        assert!(ExceptionKind::KeyError.is_subclass_of(ExceptionKind::Exception));
        assert!(ExceptionKind::SystemExit.is_subclass_of(ExceptionKind::BaseException));
        assert!(!ExceptionKind::SystemExit.is_subclass_of(ExceptionKind::Exception));
        assert!(!ExceptionKind::ValueError.is_subclass_of(ExceptionKind::TypeError));
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ExceptionKind::ALL {
            assert_eq!(ExceptionKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_summary() {
        let err = RuntimeError::zero_division("division by zero");
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");

        let key = RuntimeError::key_error(Value::str("missing"));
        assert_eq!(key.to_string(), "KeyError: 'missing'");

        let bare = ExceptionObject::new(ExceptionKind::StopIteration, Vec::new());
        assert_eq!(bare.summary(), "StopIteration");
    }

    #[test]
    fn test_value_errors_map_to_exceptions() {
        let err: RuntimeError = ValueError::Unhashable("list").into();
        assert!(err.is_kind(ExceptionKind::TypeError));
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'list'");

        let err: RuntimeError = ValueError::TooDeep.into();
        assert!(err.is_kind(ExceptionKind::RuntimeError));
    }

    #[test]
    fn test_format_traceback() {
        let raised = RaisedException {
            object: Rc::new(ExceptionObject::new(
                ExceptionKind::ValueError,
                vec![Value::str("bad")],
            )),
            reported_in: None,
            traceback: vec![
                TracebackEntry {
                    filename: "<user-code>".into(),
                    line: 2,
                    function_name: "<module>".into(),
                },
            ],
        };
        let text = format_traceback(&raised, &["x = 1", "  f(x)  "]);
        assert_eq!(
            text,
            "Traceback (most recent call last):\n  File \"<user-code>\", line 2, in <module>\n    f(x)\nValueError: bad\n"
        );
    }
}
