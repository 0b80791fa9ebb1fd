//! Pre-flight and post-deployment verification.
//!
//! The precheck validates local tool versions, cloud session validity, and
//! name availability before any provisioning starts; the postcheck queries
//! every provisioned system afterwards and reports pass/fail per
//! component. Both are read-only against the external systems.

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::orchestration::command_executor::{CommandRunner, CommandSpec};
use std::sync::Arc;
use tracing::{info, warn};

/// One read-only verification step.
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub name: String,
    pub command: CommandSpec,
    /// Required stdout marker, in addition to a zero exit code
    pub expect_stdout: Option<String>,
}

impl CheckSpec {
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command,
            expect_stdout: None,
        }
    }

    pub fn expecting(mut self, marker: impl Into<String>) -> Self {
        self.expect_stdout = Some(marker.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Aggregated verification outcome.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub label: String,
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|result| result.passed)
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.results.iter().filter(|result| !result.passed).collect()
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("{:<45} {}\n", result.name, status));
            if !result.passed && !result.detail.is_empty() {
                out.push_str(&format!("    {}\n", result.detail.trim()));
            }
        }
        out
    }

    /// Error form for callers that treat any failure as fatal.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            let failed: Vec<String> = self
                .failures()
                .iter()
                .map(|result| result.name.clone())
                .collect();
            Err(ProvisionError::StageFailed {
                node: self.label.clone(),
                reason: format!("checks failed: {}", failed.join(", ")),
            })
        }
    }
}

/// Run checks sequentially; command failures never abort the sweep, every
/// component is reported.
pub async fn run_checks(
    label: &str,
    checks: Vec<CheckSpec>,
    runner: Arc<dyn CommandRunner>,
) -> CheckReport {
    let mut results = Vec::with_capacity(checks.len());

    for check in checks {
        let result = match runner.run(&check.command).await {
            Ok(outcome) => {
                let marker_ok = check
                    .expect_stdout
                    .as_ref()
                    .map(|marker| outcome.stdout.contains(marker))
                    .unwrap_or(true);
                CheckResult {
                    name: check.name.clone(),
                    passed: outcome.success && marker_ok,
                    detail: if outcome.success {
                        String::new()
                    } else {
                        outcome.stderr
                    },
                }
            }
            Err(error) => CheckResult {
                name: check.name.clone(),
                passed: false,
                detail: error.to_string(),
            },
        };

        if result.passed {
            info!(check = %result.name, "✅ Check passed");
        } else {
            warn!(check = %result.name, detail = %result.detail, "❌ Check failed");
        }
        results.push(result);
    }

    CheckReport {
        label: label.to_string(),
        results,
    }
}

/// Pre-flight checks: tool availability, session validity, and
/// name-uniqueness of to-be-created resources.
pub fn precheck_specs(config: &ProvisionConfig) -> Vec<CheckSpec> {
    vec![
        CheckSpec::new("tool: az", CommandSpec::new("az", ["version"])),
        CheckSpec::new("tool: kubectl", CommandSpec::new("kubectl", ["version", "--client"])),
        CheckSpec::new("tool: helm", CommandSpec::new("helm", ["version", "--short"])),
        CheckSpec::new("tool: psql", CommandSpec::new("psql", ["--version"])),
        CheckSpec::new(
            "cloud session",
            CommandSpec::new("az", ["account", "show", "--query", "id", "--output", "tsv"]),
        )
        .expecting(config.deployment.subscription_id.as_str()),
        CheckSpec::new(
            "vault name available",
            CommandSpec::new(
                "az",
                [
                    "keyvault",
                    "check-name",
                    "--name",
                    config.vault.name.as_str(),
                    "--query",
                    "nameAvailable",
                    "--output",
                    "tsv",
                ],
            ),
        )
        .expecting("true"),
        CheckSpec::new(
            "database server name available",
            CommandSpec::new(
                "az",
                [
                    "postgres",
                    "check-name-availability",
                    "--name",
                    config.database.server_name.as_str(),
                    "--query",
                    "nameAvailable",
                    "--output",
                    "tsv",
                ],
            ),
        )
        .expecting("true"),
    ]
}

/// Post-deployment checks: one per provisioned system.
pub fn postcheck_specs(config: &ProvisionConfig) -> Vec<CheckSpec> {
    let database_host = format!(
        "{}.postgres.database.azure.com",
        config.database.server_name
    );
    let function_url = format!(
        "https://{}.azurewebsites.net/api/stock_quote?symbol=MSFT",
        config.function.app_name
    );

    vec![
        CheckSpec::new(
            "cluster nodes ready",
            CommandSpec::new(
                "kubectl",
                [
                    "get",
                    "nodes",
                    "-o",
                    "jsonpath={.items[*].status.conditions[?(@.type=='Ready')].status}",
                ],
            ),
        )
        .expecting("True"),
        CheckSpec::new(
            "database accepts connections",
            CommandSpec::new("pg_isready", ["--host", database_host.as_str()]),
        ),
        CheckSpec::new(
            "cache reachable",
            CommandSpec::new(
                "az",
                [
                    "redis",
                    "show",
                    "--name",
                    config.cache.name.as_str(),
                    "--query",
                    "provisioningState",
                    "--output",
                    "tsv",
                ],
            ),
        )
        .expecting("Succeeded"),
        CheckSpec::new(
            "vault secrets present",
            CommandSpec::new(
                "az",
                [
                    "keyvault",
                    "secret",
                    "list",
                    "--vault-name",
                    config.vault.name.as_str(),
                    "--query",
                    "length(@)",
                    "--output",
                    "tsv",
                ],
            ),
        ),
        CheckSpec::new(
            "synchronized secret materialized",
            CommandSpec::new(
                "kubectl",
                [
                    "get",
                    "secret",
                    "trading-app-secrets",
                    "--namespace",
                    config.identity.namespace.as_str(),
                ],
            ),
        ),
        CheckSpec::new(
            "quote function responding",
            CommandSpec::new("curl", ["--fail", "--silent", function_url.as_str()]),
        ),
        CheckSpec::new(
            "trading app serving",
            CommandSpec::new(
                "kubectl",
                [
                    "get",
                    "deployment",
                    "trading-app",
                    "--namespace",
                    config.identity.namespace.as_str(),
                    "-o",
                    "jsonpath={.status.readyReplicas}",
                ],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::command_executor::CommandOutcome;
    use async_trait::async_trait;

    struct MarkerRunner;

    #[async_trait]
    impl CommandRunner for MarkerRunner {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
            // Fail anything touching the cache, succeed the rest
            let failing = command.args.iter().any(|arg| arg == "redis");
            Ok(CommandOutcome {
                success: !failing,
                exit_code: Some(if failing { 1 } else { 0 }),
                stdout: "ok".to_string(),
                stderr: if failing { "redis unreachable".to_string() } else { String::new() },
            })
        }
    }

    #[tokio::test]
    async fn test_checks_report_every_component() {
        let checks = vec![
            CheckSpec::new("first", CommandSpec::new("true", Vec::<String>::new())),
            CheckSpec::new("cache", CommandSpec::new("az", ["redis", "show"])),
            CheckSpec::new("last", CommandSpec::new("true", Vec::<String>::new())),
        ];
        let report = run_checks("postcheck", checks, Arc::new(MarkerRunner)).await;

        // The failing check does not stop the sweep
        assert_eq!(report.results.len(), 3);
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].name, "cache");
    }

    #[tokio::test]
    async fn test_marker_mismatch_fails_check() {
        let checks = vec![
            CheckSpec::new("marker", CommandSpec::new("true", Vec::<String>::new()))
                .expecting("absent-marker"),
        ];
        let report = run_checks("precheck", checks, Arc::new(MarkerRunner)).await;
        assert!(!report.passed());
    }

    #[test]
    fn test_into_result_names_failed_checks() {
        let report = CheckReport {
            label: "precheck".to_string(),
            results: vec![CheckResult {
                name: "cloud session".to_string(),
                passed: false,
                detail: "expired".to_string(),
            }],
        };
        let error = report.into_result().unwrap_err();
        assert!(error.to_string().contains("cloud session"));
    }
}
