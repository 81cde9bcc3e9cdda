//! Terminal output for the command-line front end.
//!
//! - **[`report`]**: writes a run's events, captured output and summary
//! - **[`theme`]**: centralized color palette
//!
//! Colors go through [crossterm](https://docs.rs/crossterm) and are only
//! emitted when the caller asks for them.

pub mod report;
pub mod theme;

pub use report::print_run;
