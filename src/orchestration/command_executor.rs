//! # Command Execution with Bounded Retry
//!
//! Runs external idempotent commands (apply a manifest, run a SQL script,
//! install a chart) and retries transient failures up to a policy's budget,
//! propagating [`ProvisionError::CommandFailed`] with the last observed
//! error output once the budget is spent.
//!
//! Precondition on every command passed here: it must be safe to repeat
//! (apply semantics, not create-only). This component does not and cannot
//! guarantee that itself.

use crate::error::{ProvisionError, Result};
use crate::graph::node::NodeAction;
use crate::orchestration::context::RunContext;
use crate::orchestration::provisioner::ResourceRef;
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables set for the child process
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line for logs and error messages.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of one command attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Transport seam for command execution; the real implementation shells
/// out, tests substitute scripted runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome>;
}

/// Runs commands as child processes via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        let mut child = tokio::process::Command::new(&command.program);
        child.args(&command.args);
        for (key, value) in &command.env {
            child.env(key, value);
        }

        let output = child.output().await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ProvisionError::InvalidConfiguration {
                    field: "command".to_string(),
                    reason: format!("{} not found on PATH", command.program),
                }
            } else {
                ProvisionError::TransientProvider {
                    operation: command.display_line(),
                    reason: error.to_string(),
                }
            }
        })?;

        Ok(CommandOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Wraps a runner in a bounded retry loop with a fixed or backoff delay.
pub struct CommandExecutor {
    runner: Arc<dyn CommandRunner>,
    policy: RetryPolicy,
}

impl CommandExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, policy: RetryPolicy) -> Self {
        Self { runner, policy }
    }

    /// Execute, retrying failed attempts until success or the policy's
    /// attempt budget is exhausted. Never runs attempt `max_attempts + 1`.
    pub async fn run_with_retry(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        let mut last_stderr = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match self.runner.run(command).await {
                Ok(outcome) if outcome.success => {
                    debug!(
                        command = %command.display_line(),
                        attempt = attempt,
                        "Command succeeded"
                    );
                    return Ok(outcome);
                }
                Ok(outcome) => {
                    warn!(
                        command = %command.display_line(),
                        attempt = attempt,
                        exit_code = ?outcome.exit_code,
                        stderr = %outcome.stderr.trim(),
                        "Command attempt failed"
                    );
                    last_stderr = outcome.stderr;
                }
                // Transport-level transient failure counts as an attempt
                Err(ProvisionError::TransientProvider { reason, .. }) => {
                    warn!(
                        command = %command.display_line(),
                        attempt = attempt,
                        reason = %reason,
                        "Command transport failed"
                    );
                    last_stderr = reason;
                }
                Err(fatal) => return Err(fatal),
            }

            if self.policy.allows_retry(attempt) {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        Err(ProvisionError::CommandFailed {
            command: command.display_line(),
            attempts: self.policy.max_attempts,
            stderr: last_stderr,
        })
    }
}

/// Node action running one retried command.
pub struct CommandAction {
    executor: CommandExecutor,
    command: CommandSpec,
}

impl CommandAction {
    pub fn new(runner: Arc<dyn CommandRunner>, policy: RetryPolicy, command: CommandSpec) -> Self {
        Self {
            executor: CommandExecutor::new(runner, policy),
            command,
        }
    }
}

#[async_trait]
impl NodeAction for CommandAction {
    async fn execute(&self, _ctx: &RunContext) -> Result<Option<ResourceRef>> {
        self.executor.run_with_retry(&self.command).await?;
        Ok(None)
    }
}
