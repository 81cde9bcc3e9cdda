//! Memory model for the traced language
//!
//! This module provides the core runtime abstractions:
//! - [`value`]: Runtime value representation (scalars, shared containers,
//!   callables, modules, exceptions)
//! - [`iter`]: Iterator state for loops and iterator built-ins
//! - [`repr`]: `repr`/`str` conversion with cycle detection
//! - [`stack`]: Call stack with frames and their namespaces
//!
//! # Sharing
//!
//! Lists and dictionaries are reference types: assigning one to a second
//! name aliases it. Copies that must not observe later mutation (trace
//! snapshots) use [`value::Value::deep_copy`].

pub mod iter;
pub mod repr;
pub mod stack;
pub mod value;

/// Largest sequence a program may build before `MemoryError`
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;
