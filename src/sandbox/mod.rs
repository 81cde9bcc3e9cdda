//! Process isolation for traced runs
//!
//! - [`orchestrator`]: spawns one executor process per run and assembles
//!   the [`RunResult`]
//! - [`executor`]: the child side, running the program under the tracer
//! - [`protocol`]: JSON-lines messages between the two
//! - [`config`]: run limits and supervision settings
//!
//! ```text
//! caller -> Orchestrator::run -> spawn `steptrace executor`
//!                                  |  ExecRequest (stdin)
//!                                  v
//!                              Interpreter + StepTracer
//!                                  |  Message per line (stdout)
//!                                  v
//!        RunResult <- reader thread <- channel
//! ```

pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod protocol;

pub use config::{ExecutorCommand, SandboxConfig, TraceLimits};
pub use orchestrator::{Orchestrator, RunResult, SandboxError};
