//! Run limits and executor settings
//!
//! [`TraceLimits`] travels to the executor inside the request and bounds one
//! run; [`SandboxConfig`] stays in the orchestrator and says how executors
//! are started and supervised.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Subcommand of the `steptrace` binary that runs one program in isolation
pub const EXECUTOR_SUBCOMMAND: &str = "executor";

/// Invalid run limits
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_steps must be greater than zero")]
    ZeroSteps,

    #[error("hard timeout must be a positive number of seconds, got {0}")]
    Timeout(f64),

    #[error("render limit must be at least 4 characters, got {0}")]
    RenderLimit(usize),
}

/// Budget and output bounds for one traced run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceLimits {
    /// Trace events allowed before the run is cut off
    pub max_steps: u64,
    /// Wall-clock budget checked at every trace event
    pub hard_timeout_secs: f64,
    /// Maximum length of any rendered value
    pub render_limit: usize,
    /// Cap on each captured output stream
    pub max_output_bytes: usize,
}

impl Default for TraceLimits {
    fn default() -> Self {
        TraceLimits {
            max_steps: 50_000,
            hard_timeout_secs: 8.0,
            render_limit: crate::trace::render::DEFAULT_RENDER_LIMIT,
            max_output_bytes: 1 << 20,
        }
    }
}

impl TraceLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroSteps);
        }
        if !self.hard_timeout_secs.is_finite() || self.hard_timeout_secs <= 0.0 {
            return Err(ConfigError::Timeout(self.hard_timeout_secs));
        }
        if self.render_limit < 4 {
            return Err(ConfigError::RenderLimit(self.render_limit));
        }
        Ok(())
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.hard_timeout_secs).unwrap_or(Duration::MAX)
    }
}

/// How to start an executor process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExecutorCommand {
    /// `steptrace executor`, using the given binary
    pub fn steptrace(program: impl Into<PathBuf>) -> Self {
        ExecutorCommand {
            program: program.into(),
            args: vec![EXECUTOR_SUBCOMMAND.to_string()],
        }
    }

    /// The currently running binary's own executor mode
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::steptrace(std::env::current_exe()?))
    }
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub executor: ExecutorCommand,
    /// How long each queue poll waits before re-checking the process
    pub poll_interval: Duration,
    /// Extra time past the hard timeout before the executor is killed;
    /// `None` never kills
    pub kill_grace: Option<Duration>,
    /// How long to wait for the reader to finish after the process exits
    pub drain_timeout: Duration,
}

impl SandboxConfig {
    pub fn new(executor: ExecutorCommand) -> Self {
        SandboxConfig {
            executor,
            poll_interval: Duration::from_millis(100),
            kill_grace: Some(Duration::from_secs(2)),
            drain_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_kill_grace(mut self, kill_grace: Option<Duration>) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let limits = TraceLimits::default();
        assert_eq!(limits.max_steps, 50_000);
        assert_eq!(limits.render_limit, 160);
        assert!(limits.validate().is_ok());
        assert_eq!(limits.hard_timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_validation() {
        let limits = TraceLimits {
            max_steps: 0,
            ..TraceLimits::default()
        };
        assert_eq!(limits.validate(), Err(ConfigError::ZeroSteps));

        for timeout in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let limits = TraceLimits {
                hard_timeout_secs: timeout,
                ..TraceLimits::default()
            };
            assert!(matches!(limits.validate(), Err(ConfigError::Timeout(_))));
        }

        let limits = TraceLimits {
            render_limit: 3,
            ..TraceLimits::default()
        };
        assert_eq!(limits.validate(), Err(ConfigError::RenderLimit(3)));
    }

    #[test]
    fn test_partial_json() {
        let limits: TraceLimits = serde_json::from_str(r#"{"max_steps": 10}"#).unwrap();
        assert_eq!(limits.max_steps, 10);
        assert_eq!(limits.hard_timeout_secs, 8.0);
    }

    #[test]
    fn test_executor_command() {
        let command = ExecutorCommand::steptrace("/bin/steptrace");
        assert_eq!(command.args, ["executor"]);
        let config = SandboxConfig::new(command).with_kill_grace(None);
        assert!(config.kill_grace.is_none());
    }
}
