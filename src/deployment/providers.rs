//! CLI-backed implementations of the orchestration seams.
//!
//! The reference workflow drives cloud and cluster control planes through
//! their CLIs (idempotent `create`/`apply` style invocations). These
//! adapters wrap declared commands behind the provisioner, probe, applier,
//! and secret-writer traits; no cloud SDK bindings are involved.

use crate::error::{ProvisionError, Result};
use crate::orchestration::command_executor::{CommandExecutor, CommandRunner, CommandSpec};
use crate::orchestration::context::RunContext;
use crate::orchestration::provisioner::{ResourceProvisioner, ResourceRef};
use crate::orchestration::readiness::ReadinessProbe;
use crate::resilience::RetryPolicy;
use crate::secrets::bridge::{ClusterApplier, SecretStoreWriter};
use crate::secrets::records::SecretRecord;
use crate::validation;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Environment variable through which secret values reach store commands,
/// keeping them out of argv and error output.
pub const SECRET_VALUE_ENV: &str = "PROVISION_SECRET_VALUE";

/// Map a failed CLI invocation to the error taxonomy by inspecting its
/// stderr. Provider CLIs signal these conditions with well-known phrases.
fn classify_cli_failure(operation: &str, stderr: &str) -> ProvisionError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("authorizationfailed")
        || lowered.contains("permission denied")
        || lowered.contains("forbidden")
    {
        ProvisionError::PermissionDenied {
            operation: operation.to_string(),
            reason: stderr.trim().to_string(),
        }
    } else if lowered.contains("name is already taken")
        || lowered.contains("already in use")
        || lowered.contains("vaultalreadyexists")
    {
        ProvisionError::NameCollision {
            kind: operation.to_string(),
            name: stderr.trim().to_string(),
        }
    } else {
        ProvisionError::TransientProvider {
            operation: operation.to_string(),
            reason: stderr.trim().to_string(),
        }
    }
}

/// Provisioner issuing one idempotent CLI upsert per `ensure` call.
pub struct CliResourceProvisioner {
    kind: String,
    name: String,
    ensure_command: CommandSpec,
    destroy_command: Option<CommandSpec>,
    runner: Arc<dyn CommandRunner>,
    /// Endpoint advertised on the resulting reference, when known up front
    endpoint: Option<String>,
}

impl CliResourceProvisioner {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        ensure_command: CommandSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ensure_command,
            destroy_command: None,
            runner,
            endpoint: None,
        }
    }

    pub fn with_destroy(mut self, command: CommandSpec) -> Self {
        self.destroy_command = Some(command);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[async_trait]
impl ResourceProvisioner for CliResourceProvisioner {
    fn resource_kind(&self) -> &str {
        &self.kind
    }

    fn validate(&self) -> Result<()> {
        validation::validate_resource_name(&self.kind, &self.name)
    }

    async fn ensure(&self, _ctx: &RunContext) -> Result<ResourceRef> {
        let outcome = self.runner.run(&self.ensure_command).await?;
        if !outcome.success {
            return Err(classify_cli_failure(&self.kind, &outcome.stderr));
        }
        debug!(kind = %self.kind, name = %self.name, "Resource upsert accepted");

        let mut resource = ResourceRef::new(&self.kind, &self.name);
        if let Some(endpoint) = &self.endpoint {
            resource = resource.with_endpoint(endpoint.clone());
        }
        Ok(resource)
    }

    async fn destroy(&self, _ctx: &RunContext) -> Result<()> {
        let Some(command) = &self.destroy_command else {
            return Ok(());
        };
        let outcome = self.runner.run(command).await?;
        if !outcome.success {
            return Err(classify_cli_failure(&self.kind, &outcome.stderr));
        }
        Ok(())
    }
}

/// Probe that reports ready when its command exits zero (and, when set,
/// stdout contains the expected marker).
pub struct CliReadinessProbe {
    target: String,
    command: CommandSpec,
    expect_stdout: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl CliReadinessProbe {
    pub fn new(
        target: impl Into<String>,
        command: CommandSpec,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            target: target.into(),
            command,
            expect_stdout: None,
            runner,
        }
    }

    pub fn expecting(mut self, marker: impl Into<String>) -> Self {
        self.expect_stdout = Some(marker.into());
        self
    }
}

#[async_trait]
impl ReadinessProbe for CliReadinessProbe {
    fn target(&self) -> &str {
        &self.target
    }

    async fn check(&self, _ctx: &RunContext) -> Result<bool> {
        let outcome = match self.runner.run(&self.command).await {
            Ok(outcome) => outcome,
            // Transport hiccups during observation are "not ready yet"
            Err(ProvisionError::TransientProvider { .. }) => return Ok(false),
            Err(fatal) => return Err(fatal),
        };
        if !outcome.success {
            return Ok(false);
        }
        match &self.expect_stdout {
            Some(marker) => Ok(outcome.stdout.contains(marker)),
            None => Ok(true),
        }
    }
}

/// Applies a cluster-side declarative resource with retry.
pub struct CliClusterApplier {
    resource: String,
    executor: CommandExecutor,
    command: CommandSpec,
}

impl CliClusterApplier {
    pub fn new(
        resource: impl Into<String>,
        command: CommandSpec,
        runner: Arc<dyn CommandRunner>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            resource: resource.into(),
            executor: CommandExecutor::new(runner, policy),
            command,
        }
    }
}

#[async_trait]
impl ClusterApplier for CliClusterApplier {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn apply(&self, _ctx: &RunContext) -> Result<()> {
        self.executor.run_with_retry(&self.command).await?;
        Ok(())
    }
}

/// Writes secret records into the external vault, one retried CLI call per
/// record. The value travels via [`SECRET_VALUE_ENV`], never argv.
pub struct VaultSecretWriter {
    vault_name: String,
    executor: CommandExecutor,
}

impl VaultSecretWriter {
    pub fn new(
        vault_name: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            vault_name: vault_name.into(),
            executor: CommandExecutor::new(runner, policy),
        }
    }
}

#[async_trait]
impl SecretStoreWriter for VaultSecretWriter {
    async fn put(&self, record: &SecretRecord, _ctx: &RunContext) -> Result<()> {
        let value_placeholder = format!("${SECRET_VALUE_ENV}");
        let command = CommandSpec::new(
            "az",
            [
                "keyvault",
                "secret",
                "set",
                "--vault-name",
                self.vault_name.as_str(),
                "--name",
                record.key.as_str(),
                "--value",
                value_placeholder.as_str(),
            ],
        )
        .with_env(SECRET_VALUE_ENV, record.value().expose());

        self.executor.run_with_retry(&command).await?;
        debug!(vault = %self.vault_name, key = %record.key, "Secret record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::command_executor::CommandOutcome;
    use parking_lot::Mutex;

    struct CannedRunner {
        outcome: CommandOutcome,
        seen: Mutex<Vec<CommandSpec>>,
    }

    impl CannedRunner {
        fn new(success: bool, stderr: &str) -> Self {
            Self {
                outcome: CommandOutcome {
                    success,
                    exit_code: Some(if success { 0 } else { 1 }),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                },
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for CannedRunner {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
            self.seen.lock().push(command.clone());
            Ok(self.outcome.clone())
        }
    }

    #[tokio::test]
    async fn test_permission_failures_classify_as_fatal() {
        let runner = Arc::new(CannedRunner::new(false, "AuthorizationFailed: no access"));
        let provisioner = CliResourceProvisioner::new(
            "vnet",
            "trading-vnet",
            CommandSpec::new("az", ["network", "vnet", "create"]),
            runner,
        );
        let error = provisioner.ensure(&RunContext::new()).await.unwrap_err();
        assert!(matches!(error, ProvisionError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_name_collisions_classify_as_fatal() {
        let runner = Arc::new(CannedRunner::new(false, "VaultAlreadyExists elsewhere"));
        let provisioner = CliResourceProvisioner::new(
            "key-vault",
            "kv-trading",
            CommandSpec::new("az", ["keyvault", "create"]),
            runner,
        );
        let error = provisioner.ensure(&RunContext::new()).await.unwrap_err();
        assert!(matches!(error, ProvisionError::NameCollision { .. }));
    }

    #[tokio::test]
    async fn test_other_failures_classify_as_transient() {
        let runner = Arc::new(CannedRunner::new(false, "InternalServerError, retry later"));
        let provisioner = CliResourceProvisioner::new(
            "vnet",
            "trading-vnet",
            CommandSpec::new("az", ["network", "vnet", "create"]),
            runner,
        );
        let error = provisioner.ensure(&RunContext::new()).await.unwrap_err();
        assert!(matches!(error, ProvisionError::TransientProvider { .. }));
    }

    #[tokio::test]
    async fn test_probe_checks_stdout_marker() {
        let runner = Arc::new(CannedRunner {
            outcome: CommandOutcome {
                success: true,
                exit_code: Some(0),
                stdout: "status: Running".to_string(),
                stderr: String::new(),
            },
            seen: Mutex::new(Vec::new()),
        });
        let probe = CliReadinessProbe::new(
            "pods-running",
            CommandSpec::new("kubectl", ["get", "pods"]),
            runner.clone(),
        )
        .expecting("Running");
        assert!(probe.check(&RunContext::new()).await.unwrap());

        let probe = CliReadinessProbe::new(
            "pods-pending",
            CommandSpec::new("kubectl", ["get", "pods"]),
            runner,
        )
        .expecting("Pending");
        assert!(!probe.check(&RunContext::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_secret_value_travels_via_env() {
        let runner = Arc::new(CannedRunner::new(true, ""));
        let writer = VaultSecretWriter::new(
            "kv-trading",
            runner.clone(),
            RetryPolicy::no_retry(),
        );
        let record = SecretRecord::new("database-connection-string", "postgres://secret");
        writer.put(&record, &RunContext::new()).await.unwrap();

        let seen = runner.seen.lock();
        let command = &seen[0];
        assert!(!command.args.iter().any(|arg| arg.contains("postgres://secret")));
        assert!(command
            .env
            .iter()
            .any(|(key, value)| key == SECRET_VALUE_ENV && value == "postgres://secret"));
    }
}
