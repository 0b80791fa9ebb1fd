//! # Sample Trading-Application Deployment Plan
//!
//! Builds the full provisioning graph for the trading environment from
//! validated configuration: network, managed cluster, relational database,
//! cache, secret store with workload-identity federation, optional service
//! mesh add-on, serverless quote function, cluster bootstrap, and the
//! final application deployment.
//!
//! The plan is configuration data consumed by the orchestrator; every
//! ordering relationship is a declared edge, never an artifact of
//! declaration order.

use crate::config::{ProvisionConfig, MESH_FEATURE};
use crate::error::Result;
use crate::graph::{Graph, GraphBuilder, Guard, NodeId, NodeSpec};
use crate::orchestration::command_executor::{CommandAction, CommandRunner, CommandSpec};
use crate::orchestration::provisioner::{DestroyAction, ProvisionAction};
use crate::orchestration::readiness::ReadinessAction;
use crate::secrets::bridge::{BridgeTracker, SecretMaterializationBridge};
use crate::secrets::records::SecretRecord;
use std::sync::Arc;

use super::providers::{
    CliClusterApplier, CliReadinessProbe, CliResourceProvisioner, VaultSecretWriter,
};

/// Well-known node ids for the deployment graph.
pub mod nodes {
    pub const NETWORK: &str = "network";
    pub const CLUSTER: &str = "cluster";
    pub const CLUSTER_READY: &str = "cluster-ready";
    pub const CLUSTER_CREDENTIALS: &str = "cluster-credentials";
    pub const APP_NAMESPACE: &str = "app-namespace";
    pub const SYNC_OPERATOR: &str = "secret-sync-operator";
    pub const SYNC_OPERATOR_CRDS: &str = "secret-sync-crds-established";
    pub const DATABASE: &str = "database";
    pub const DATABASE_READY: &str = "database-ready";
    pub const DATABASE_SCHEMA: &str = "database-schema";
    pub const CACHE: &str = "cache";
    pub const MESH_ADDON: &str = "mesh-addon";
    pub const MESH_INJECTION: &str = "mesh-namespace-injection";
    pub const FUNCTION_APP: &str = "quote-function";
    pub const FUNCTION_READY: &str = "quote-function-ready";
    pub const APP_DEPLOY: &str = "app-deploy";
    pub const APP_READY: &str = "app-ready";
}

/// A built plan: the validated graph plus the bridge progress tracker for
/// audit output.
pub struct DeploymentPlan {
    pub graph: Graph,
    pub bridge: Arc<BridgeTracker>,
}

impl DeploymentPlan {
    /// The symmetric teardown graph (reverse dependency order, destroy
    /// actions where declared).
    pub fn teardown_graph(&self) -> Result<Graph> {
        Ok(self.graph.teardown_graph()?)
    }
}

/// Secret records destined for the vault. Connection strings are composed
/// from declared names; credentials reach the store via the writer's
/// environment seam, never this process's argv.
fn secret_records(config: &ProvisionConfig) -> Vec<SecretRecord> {
    config
        .vault
        .synced_keys
        .iter()
        .filter_map(|key| match key.as_str() {
            "database-connection-string" => Some(SecretRecord::new(
                key.clone(),
                format!(
                    "postgresql://{}@{}.postgres.database.azure.com:5432/{}?sslmode=require",
                    config.database.admin_username,
                    config.database.server_name,
                    config.database.database_name
                ),
            )),
            "cache-connection-string" => Some(SecretRecord::new(
                key.clone(),
                format!("rediss://{}.redis.cache.windows.net:6380", config.cache.name),
            )),
            _ => None,
        })
        .collect()
}

/// Build the full deployment graph against the given command transport.
pub fn build_plan(
    config: &ProvisionConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<DeploymentPlan> {
    let retry = config.retry_policy();
    let poller = config.readiness_poller();
    let mut builder = GraphBuilder::new();

    let provision_node = |id: &str,
                          kind: &str,
                          name: &str,
                          ensure: CommandSpec,
                          destroy: CommandSpec|
     -> NodeSpec {
        let provisioner = Arc::new(
            CliResourceProvisioner::new(kind, name, ensure, runner.clone()).with_destroy(destroy),
        );
        NodeSpec::new(id, Arc::new(ProvisionAction::new(provisioner.clone(), retry)))
            .with_teardown(Arc::new(DestroyAction::new(provisioner, retry)))
    };

    let probe_node = |id: &str, target: &str, command: CommandSpec, marker: Option<&str>| {
        let mut probe = CliReadinessProbe::new(target, command, runner.clone());
        if let Some(marker) = marker {
            probe = probe.expecting(marker);
        }
        NodeSpec::new(id, Arc::new(ReadinessAction::new(Arc::new(probe), poller)))
    };

    let command_node = |id: &str, command: CommandSpec| {
        NodeSpec::new(id, Arc::new(CommandAction::new(runner.clone(), retry, command)))
    };

    let vnet_name = config.prefixed("vnet");
    let node_count = config.cluster.node_count.to_string();
    let database_host = format!(
        "{}.postgres.database.azure.com",
        config.database.server_name
    );
    let cache_size = format!("c{}", config.cache.capacity);
    let function_url = format!(
        "https://{}.azurewebsites.net/api/stock_quote?symbol=MSFT",
        config.function.app_name
    );

    // Cloud foundation
    builder.add(provision_node(
        nodes::NETWORK,
        "virtual-network",
        &vnet_name,
        CommandSpec::new(
            "az",
            [
                "network",
                "vnet",
                "create",
                "--name",
                vnet_name.as_str(),
                "--address-prefixes",
                config.network.vnet_cidr.as_str(),
                "--location",
                config.deployment.region.as_str(),
            ],
        ),
        CommandSpec::new(
            "az",
            ["network", "vnet", "delete", "--name", vnet_name.as_str(), "--yes"],
        ),
    ));

    builder.add(
        provision_node(
            nodes::CLUSTER,
            "managed-cluster",
            &config.cluster.name,
            CommandSpec::new(
                "az",
                [
                    "aks",
                    "create",
                    "--name",
                    config.cluster.name.as_str(),
                    "--node-count",
                    node_count.as_str(),
                    "--node-vm-size",
                    config.cluster.node_size.as_str(),
                    "--kubernetes-version",
                    config.cluster.kubernetes_version.as_str(),
                    "--enable-oidc-issuer",
                    "--enable-workload-identity",
                ],
            ),
            CommandSpec::new(
                "az",
                ["aks", "delete", "--name", config.cluster.name.as_str(), "--yes"],
            ),
        )
        .depends_on([nodes::NETWORK]),
    );

    builder.add(
        probe_node(
            nodes::CLUSTER_READY,
            "cluster-provisioning-succeeded",
            CommandSpec::new(
                "az",
                [
                    "aks",
                    "show",
                    "--name",
                    config.cluster.name.as_str(),
                    "--query",
                    "provisioningState",
                    "--output",
                    "tsv",
                ],
            ),
            Some("Succeeded"),
        )
        .depends_on([nodes::CLUSTER]),
    );

    builder.add(
        command_node(
            nodes::CLUSTER_CREDENTIALS,
            CommandSpec::new(
                "az",
                [
                    "aks",
                    "get-credentials",
                    "--name",
                    config.cluster.name.as_str(),
                    "--overwrite-existing",
                ],
            ),
        )
        .depends_on([nodes::CLUSTER_READY]),
    );

    // Cluster bootstrap
    builder.add(
        command_node(
            nodes::APP_NAMESPACE,
            CommandSpec::new(
                "kubectl",
                ["apply", "-f", "manifests/namespace.yaml"],
            ),
        )
        .depends_on([nodes::CLUSTER_CREDENTIALS]),
    );

    builder.add(
        command_node(
            nodes::SYNC_OPERATOR,
            CommandSpec::new(
                "helm",
                [
                    "upgrade",
                    "--install",
                    "secret-sync",
                    "external-secrets/external-secrets",
                    "--namespace",
                    "secret-sync",
                    "--create-namespace",
                    "--wait",
                ],
            ),
        )
        .depends_on([nodes::CLUSTER_CREDENTIALS]),
    );

    builder.add(
        probe_node(
            nodes::SYNC_OPERATOR_CRDS,
            "secret-sync-crds-established",
            CommandSpec::new(
                "kubectl",
                [
                    "get",
                    "crd",
                    "externalsecrets.external-secrets.io",
                    "-o",
                    "jsonpath={.status.conditions[?(@.type=='Established')].status}",
                ],
            ),
            Some("True"),
        )
        .depends_on([nodes::SYNC_OPERATOR]),
    );

    // Data services
    builder.add(
        provision_node(
            nodes::DATABASE,
            "postgres-flexible-server",
            &config.database.server_name,
            CommandSpec::new(
                "az",
                [
                    "postgres",
                    "flexible-server",
                    "create",
                    "--name",
                    config.database.server_name.as_str(),
                    "--sku-name",
                    config.database.sku.as_str(),
                    "--database-name",
                    config.database.database_name.as_str(),
                    "--admin-user",
                    config.database.admin_username.as_str(),
                ],
            ),
            CommandSpec::new(
                "az",
                [
                    "postgres",
                    "flexible-server",
                    "delete",
                    "--name",
                    config.database.server_name.as_str(),
                    "--yes",
                ],
            ),
        )
        .depends_on([nodes::NETWORK]),
    );

    builder.add(
        probe_node(
            nodes::DATABASE_READY,
            "database-accepts-connections",
            CommandSpec::new(
                "pg_isready",
                [
                    "--host",
                    database_host.as_str(),
                    "--dbname",
                    config.database.database_name.as_str(),
                ],
            ),
            None,
        )
        .depends_on([nodes::DATABASE]),
    );

    builder.add(
        command_node(
            nodes::DATABASE_SCHEMA,
            CommandSpec::new(
                "psql",
                [
                    "--host",
                    database_host.as_str(),
                    "--dbname",
                    config.database.database_name.as_str(),
                    "--file",
                    "sql/schema.sql",
                ],
            ),
        )
        .depends_on([nodes::DATABASE_READY]),
    );

    builder.add(
        provision_node(
            nodes::CACHE,
            "managed-cache",
            &config.cache.name,
            CommandSpec::new(
                "az",
                [
                    "redis",
                    "create",
                    "--name",
                    config.cache.name.as_str(),
                    "--sku",
                    config.cache.sku.as_str(),
                    "--vm-size",
                    cache_size.as_str(),
                ],
            ),
            CommandSpec::new(
                "az",
                ["redis", "delete", "--name", config.cache.name.as_str(), "--yes"],
            ),
        )
        .depends_on([nodes::NETWORK]),
    );

    // Service mesh subtree, pruned wholesale by the feature toggle
    builder.add(
        command_node(
            nodes::MESH_ADDON,
            CommandSpec::new(
                "az",
                ["aks", "mesh", "enable", "--name", config.cluster.name.as_str()],
            ),
        )
        .depends_on([nodes::CLUSTER_READY])
        .guarded_by(Guard::FeatureEnabled(MESH_FEATURE.to_string())),
    );

    builder.add(
        command_node(
            nodes::MESH_INJECTION,
            CommandSpec::new(
                "kubectl",
                [
                    "label",
                    "namespace",
                    config.identity.namespace.as_str(),
                    "istio.io/rev=asm-stable",
                    "--overwrite",
                ],
            ),
        )
        .depends_on([nodes::MESH_ADDON, nodes::APP_NAMESPACE])
        .guarded_by(Guard::FeatureEnabled(MESH_FEATURE.to_string())),
    );

    // Serverless quote function
    builder.add(provision_node(
        nodes::FUNCTION_APP,
        "function-app",
        &config.function.app_name,
        CommandSpec::new(
            "az",
            [
                "functionapp",
                "create",
                "--name",
                config.function.app_name.as_str(),
                "--consumption-plan-location",
                config.deployment.region.as_str(),
            ],
        ),
        CommandSpec::new(
            "az",
            ["functionapp", "delete", "--name", config.function.app_name.as_str()],
        ),
    ));

    builder.add(
        probe_node(
            nodes::FUNCTION_READY,
            "quote-function-responding",
            CommandSpec::new("curl", ["--fail", "--silent", function_url.as_str()]),
            None,
        )
        .depends_on([nodes::FUNCTION_APP]),
    );

    // Secret materialization bridge
    let bridge = SecretMaterializationBridge {
        vault: Arc::new(
            CliResourceProvisioner::new(
                "key-vault",
                config.vault.name.as_str(),
                CommandSpec::new(
                    "az",
                    [
                        "keyvault",
                        "create",
                        "--name",
                        config.vault.name.as_str(),
                        "--enable-rbac-authorization",
                    ],
                ),
                runner.clone(),
            )
            .with_destroy(CommandSpec::new(
                "az",
                ["keyvault", "delete", "--name", config.vault.name.as_str()],
            )),
        ),
        store_writer: Arc::new(VaultSecretWriter::new(
            config.vault.name.as_str(),
            runner.clone(),
            retry,
        )),
        records: secret_records(config),
        identity: Arc::new(CliResourceProvisioner::new(
            "workload-identity",
            config.identity.name.as_str(),
            CommandSpec::new(
                "az",
                ["identity", "create", "--name", config.identity.name.as_str()],
            ),
            runner.clone(),
        )),
        namespace: config.identity.namespace.clone(),
        service_account: config.identity.service_account.clone(),
        controller_probe: Arc::new(
            CliReadinessProbe::new(
                "secret-sync-webhook-ready",
                CommandSpec::new(
                    "kubectl",
                    [
                        "get",
                        "deployment",
                        "secret-sync-external-secrets-webhook",
                        "--namespace",
                        "secret-sync",
                        "-o",
                        "jsonpath={.status.readyReplicas}",
                    ],
                ),
                runner.clone(),
            )
            .expecting("1"),
        ),
        connection_applier: Arc::new(CliClusterApplier::new(
            "secret-store-connection",
            CommandSpec::new("kubectl", ["apply", "-f", "manifests/secret-store.yaml"]),
            runner.clone(),
            retry,
        )),
        connection_probe: Arc::new(
            CliReadinessProbe::new(
                "secret-store-connection-ready",
                CommandSpec::new(
                    "kubectl",
                    [
                        "get",
                        "clustersecretstore",
                        "trading-vault",
                        "-o",
                        "jsonpath={.status.conditions[?(@.type=='Ready')].status}",
                    ],
                ),
                runner.clone(),
            )
            .expecting("True"),
        ),
        namespace_applier: Arc::new(CliClusterApplier::new(
            "app-namespace",
            CommandSpec::new("kubectl", ["apply", "-f", "manifests/namespace.yaml"]),
            runner.clone(),
            retry,
        )),
        sync_applier: Arc::new(CliClusterApplier::new(
            "external-secret",
            CommandSpec::new("kubectl", ["apply", "-f", "manifests/external-secret.yaml"]),
            runner.clone(),
            retry,
        )),
        secret_probe: Arc::new(CliReadinessProbe::new(
            "synchronized-secret-present",
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
            runner.clone(),
        )),
        poller,
    };

    let (key_sync, bridge_tracker) = bridge.register(
        &mut builder,
        &[],
        &[NodeId::new(nodes::CLUSTER_READY)],
        &[NodeId::new(nodes::SYNC_OPERATOR_CRDS)],
    );

    // The application's custom resource assumes the synchronized secret
    // already exists with the expected keys.
    builder.add(
        command_node(
            nodes::APP_DEPLOY,
            CommandSpec::new("kubectl", ["apply", "-f", "manifests/trading-app.yaml"]),
        )
        .depends_on([
            NodeId::new(nodes::APP_NAMESPACE),
            NodeId::new(nodes::DATABASE_SCHEMA),
            NodeId::new(nodes::CACHE),
            NodeId::new(nodes::FUNCTION_READY),
            NodeId::new(nodes::MESH_INJECTION),
            key_sync,
        ]),
    );

    builder.add(
        probe_node(
            nodes::APP_READY,
            "app-load-balancer-address-assigned",
            CommandSpec::new(
                "kubectl",
                [
                    "get",
                    "service",
                    "trading-app",
                    "--namespace",
                    config.identity.namespace.as_str(),
                    "-o",
                    "jsonpath={.status.loadBalancer.ingress[0].ip}",
                ],
            ),
            Some("."),
        )
        .depends_on([nodes::APP_DEPLOY]),
    );

    let graph = builder.build()?;
    Ok(DeploymentPlan {
        graph,
        bridge: bridge_tracker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::command_executor::CommandOutcome;
    use crate::secrets::bridge::nodes as bridge_nodes;
    use async_trait::async_trait;

    struct AlwaysOk;

    #[async_trait]
    impl CommandRunner for AlwaysOk {
        async fn run(&self, _command: &CommandSpec) -> Result<CommandOutcome> {
            Ok(CommandOutcome {
                success: true,
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn sample_config() -> ProvisionConfig {
        serde_yaml::from_str(crate::config::ConfigManager::starter_yaml()).unwrap()
    }

    #[test]
    fn test_plan_builds_valid_graph() {
        let plan = build_plan(&sample_config(), Arc::new(AlwaysOk)).unwrap();
        assert!(plan.graph.topological_sort().is_ok());
        // Every named stage is present
        for id in [
            nodes::NETWORK,
            nodes::CLUSTER,
            nodes::DATABASE_READY,
            nodes::APP_DEPLOY,
            bridge_nodes::KEY_SYNC,
        ] {
            assert!(plan.graph.node(&NodeId::new(id)).is_some(), "missing {id}");
        }
    }

    #[test]
    fn test_app_deploy_waits_for_key_sync() {
        let plan = build_plan(&sample_config(), Arc::new(AlwaysOk)).unwrap();
        let deploy = plan.graph.node(&NodeId::new(nodes::APP_DEPLOY)).unwrap();
        assert!(deploy
            .depends_on
            .contains(&NodeId::new(bridge_nodes::KEY_SYNC)));
    }

    #[test]
    fn test_mesh_nodes_are_guarded() {
        let plan = build_plan(&sample_config(), Arc::new(AlwaysOk)).unwrap();
        for id in [nodes::MESH_ADDON, nodes::MESH_INJECTION] {
            let node = plan.graph.node(&NodeId::new(id)).unwrap();
            assert!(node.guard.is_some(), "{id} should carry the mesh guard");
        }
        // The non-mesh graph shape is identical either way: guards only
        // prune at run time, never restructure edges.
        let deploy = plan.graph.node(&NodeId::new(nodes::APP_DEPLOY)).unwrap();
        assert!(deploy.depends_on.contains(&NodeId::new(nodes::MESH_INJECTION)));
    }

    #[test]
    fn test_secret_records_follow_synced_keys() {
        let mut config = sample_config();
        config.vault.synced_keys = vec!["database-connection-string".to_string()];
        let records = secret_records(&config);
        assert_eq!(records.len(), 1);
        assert!(records[0].value().expose().contains("psql-trading-dev"));
    }

    #[test]
    fn test_teardown_graph_reverses_app_before_cluster() {
        let plan = build_plan(&sample_config(), Arc::new(AlwaysOk)).unwrap();
        let teardown = plan.teardown_graph().unwrap();
        let order = teardown.topological_sort().unwrap();
        let position = |id: &str| order.iter().position(|n| n.as_str() == id).unwrap();
        assert!(position(nodes::APP_DEPLOY) < position(nodes::CLUSTER));
        assert!(position(nodes::CLUSTER) < position(nodes::NETWORK));
    }
}
