//! Tree-walking interpreter for the traced language
//!
//! This module provides the execution side of the sandbox:
//! - [`engine`]: The [`Interpreter`] itself, frames and name resolution
//! - [`statements`] / [`expressions`]: AST execution
//! - [`ops`]: Operator semantics over values
//! - [`builtins`], [`methods`], [`modules`], [`format`]: The standard library
//! - [`hook`]: Instrumentation interface the tracer plugs into
//! - [`terminal`]: Captured standard streams
//! - [`errors`]: Exceptions and tracebacks
//!
//! # Execution Model
//!
//! The interpreter walks the AST one statement at a time. Before each
//! statement it reports a `line` event to the hook; calls, returns and
//! exceptions are reported the same way. A hook may halt the run at any
//! event, in which case [`errors::RuntimeError::Halted`] unwinds every frame
//! without running `except` or `finally` blocks.

pub mod builtins;
pub mod engine;
pub mod errors;
pub mod expressions;
pub mod format;
pub mod hook;
pub mod methods;
pub mod modules;
pub mod ops;
pub mod statements;
pub mod terminal;

pub use engine::Interpreter;

/// File name of the user's program in frames and tracebacks
pub const USER_FILENAME: &str = "<user-code>";

/// File name of library code written in the traced language
pub const PRELUDE_FILENAME: &str = "<prelude>";
