//! Source parser for the traced language
//!
//! This module transforms program text into an Abstract Syntax Tree (AST):
//! - [`lexer`]: Tokenization (source text → tokens, with INDENT/DEDENT layout)
//! - [`parse`]: Parser entry point and helpers (tokens → AST)
//! - [`ast`]: AST node definitions
//!
//! # Supported Language
//!
//! The parser accepts a Python-compatible teaching subset:
//! - Statements: assignments (chained, unpacking, augmented, annotated),
//!   `if`/`elif`/`else`, `while`/`for` with `else`, `try`/`except`/`finally`,
//!   `def`, `return`, `global`, `nonlocal`, `del`, `assert`, `raise`, imports
//! - Expressions: arithmetic, bitwise, chained comparisons, boolean operators,
//!   conditional expressions, `lambda`, calls with keyword arguments,
//!   subscripts and slices, list/dict comprehensions, generator expressions,
//!   f-strings
//! - No classes, sets, decorators, `with`, `yield` or star arguments
//!
//! # Parser Implementation
//!
//! Hand-written recursive descent parser, one method per precedence level.
//! No external parser generator dependencies.

pub mod ast;
pub mod expressions;
pub mod lexer;
pub mod parse;
pub mod scope;
pub mod statements;

pub use parse::{parse_source, ParseError, Parser};
