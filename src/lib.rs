//! # Introduction
//!
//! steptrace runs a small Python teaching subset step by step inside a
//! separate executor process and records what every line did to the
//! program's variables.
//!
//! ## Execution pipeline
//!
//! ```text
//! Source -> Orchestrator -> executor process
//!                             Lexer -> Parser -> AST -> Interpreter
//!                                                        | hook
//!                                                   StepTracer -> JSON lines
//! RunResult <- Orchestrator <----------------------------'
//! ```
//!
//! 1. [`parser`]: tokenises the source and builds an AST.
//! 2. [`interpreter`]: walks the AST and reports every call, line, return
//!    and exception to an installed [`interpreter::hook::Hook`].
//! 3. [`memory`]: runtime values, frames, and their rendering.
//! 4. [`snapshot`]: deep copies of frame bindings between trace events.
//! 5. [`trace`]: value rendering, binding diffs and the step tracer.
//! 6. [`sandbox`]: the executor process, its wire protocol and the
//!    orchestrator that supervises it.
//! 7. [`explain`]: optional per-event explanations.
//! 8. [`ui`]: terminal report for the command-line front end.
//!
//! ## Supported subset
//!
//! Values: `None`, booleans, 64-bit ints, floats, strings, lists, tuples,
//! dicts, functions and iterators.
//! Control flow: `if/elif/else`, `while`, `for`, `break`, `continue`,
//! `try/except/finally`, `raise`, `return`, `def`, `lambda`.
//! Modules: `math`, `sys`, `os`, `signal`, `time`, `functools`.

pub mod explain;
pub mod interpreter;
pub mod memory;
pub mod parser;
pub mod sandbox;
pub mod snapshot;
pub mod trace;
pub mod ui;
