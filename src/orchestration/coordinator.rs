//! # Dependency Graph Coordinator
//!
//! Topological scheduler for the provisioning graph. Maintains the ready
//! set (pending nodes whose predecessors all resolved to `succeeded` or
//! `skipped`), runs ready nodes concurrently up to a configured bound, and
//! propagates the first failure to every transitive dependent without
//! re-attempting their actions.
//!
//! ## Ownership rules
//!
//! The coordinator loop is the single writer of the node status table and
//! the resource reference store; node tasks hand their outcome back over
//! the join set. Sibling nodes therefore never contend on shared state.
//!
//! ## Blocking points
//!
//! The only legitimate suspensions in a run are readiness-poll waits and
//! inter-retry delays inside node actions; the coordinator itself only
//! awaits task completion (or the whole-run deadline).

use super::context::RunContext;
use super::provisioner::ResourceRef;
use super::types::{ExecutionOptions, FailurePolicy, NodeResult, RunOutcome, RunReport};
use crate::error::{ProvisionError, Result};
use crate::graph::{Graph, NodeId};
use crate::state_machine::{NodeEvent, NodeState, NodeStateMachine};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

struct NodeTracker {
    machine: NodeStateMachine,
    error: Option<ProvisionError>,
    started: Option<Instant>,
    duration: Option<Duration>,
}

impl NodeTracker {
    fn new(id: &NodeId) -> Self {
        Self {
            machine: NodeStateMachine::new(id.as_str()),
            error: None,
            started: None,
            duration: None,
        }
    }

    fn state(&self) -> NodeState {
        self.machine.current_state()
    }
}

/// Walks the graph to completion, one run at a time.
pub struct Coordinator {
    options: ExecutionOptions,
}

impl Coordinator {
    pub fn new(options: ExecutionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Execute every node of `graph` respecting declared edges, guards, the
    /// failure policy, and the optional whole-run deadline. Always returns
    /// a complete audit report; the outcome field carries the verdict.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, nodes = graph.len()))]
    pub async fn run(&self, graph: &Graph, ctx: Arc<RunContext>) -> RunReport {
        let run_started = Instant::now();
        let started_at = Utc::now();

        info!(
            max_parallel = self.options.max_parallel,
            failure_policy = ?self.options.failure_policy,
            deadline = ?self.options.run_deadline,
            "🚀 Starting provisioning run"
        );

        let mut trackers: HashMap<NodeId, NodeTracker> = graph
            .node_ids()
            .map(|id| (id.clone(), NodeTracker::new(id)))
            .collect();

        // Guards are evaluated exactly once, before any scheduling; pruned
        // nodes satisfy dependents as if they had succeeded.
        self.apply_guards(graph, &mut trackers);

        let order = match graph.topological_sort() {
            Ok(order) => order,
            Err(graph_error) => {
                // Graphs are validated at construction; reaching this is an
                // orchestrator bug, reported rather than panicked on.
                error!(error = %graph_error, "Graph failed topological sort at run time");
                return self.report_internal_failure(ctx.run_id, started_at, graph, graph_error.into());
            }
        };

        let mut join_set: JoinSet<(NodeId, Result<Option<ResourceRef>>)> = JoinSet::new();
        let mut task_nodes: HashMap<tokio::task::Id, NodeId> = HashMap::new();
        let mut halted = false;
        let mut deadline_hit = false;
        let deadline = self
            .options
            .run_deadline
            .map(|budget| tokio::time::Instant::now() + budget);

        loop {
            if !halted {
                self.schedule_ready(graph, &order, &mut trackers, &mut join_set, &mut task_nodes, &ctx);
            }

            if join_set.is_empty() {
                break;
            }

            let joined = match deadline {
                Some(at) => tokio::select! {
                    joined = join_set.join_next() => joined,
                    _ = tokio::time::sleep_until(at) => {
                        deadline_hit = true;
                        None
                    }
                },
                None => join_set.join_next().await,
            };

            let Some(join_result) = joined else {
                if deadline_hit {
                    warn!(elapsed = ?run_started.elapsed(), "⏰ Run deadline exceeded, cancelling pending work");
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    self.fail_running_nodes(&mut trackers, run_started);
                }
                break;
            };

            match join_result {
                Ok((id, Ok(resource))) => {
                    self.complete_node(graph, &mut trackers, &ctx, &id, resource, &mut halted);
                }
                Ok((id, Err(action_error))) => {
                    self.fail_node(graph, &mut trackers, &id, action_error, &mut halted);
                }
                Err(join_error) => {
                    if !join_error.is_cancelled() {
                        // A panicked action must not wedge the run; the node
                        // is failed like any other terminal error.
                        if let Some(id) = task_nodes.get(&join_error.id()).cloned() {
                            let panic_error =
                                ProvisionError::Internal(format!("node action panicked: {join_error}"));
                            self.fail_node(graph, &mut trackers, &id, panic_error, &mut halted);
                        } else {
                            error!(error = %join_error, "Node action panicked");
                        }
                    }
                }
            }
        }

        let finished_at = Utc::now();
        let nodes: Vec<NodeResult> = graph
            .node_ids()
            .map(|id| {
                let tracker = &trackers[id];
                NodeResult {
                    id: id.clone(),
                    state: tracker.state(),
                    duration: tracker.duration,
                    error: tracker.error.clone(),
                }
            })
            .collect();

        let failed: Vec<NodeId> = nodes
            .iter()
            .filter(|node| node.state == NodeState::Failed)
            .map(|node| node.id.clone())
            .collect();

        let outcome = if deadline_hit {
            RunOutcome::DeadlineExceeded {
                elapsed: run_started.elapsed(),
            }
        } else if failed.is_empty() {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed {
                failed_nodes: failed,
            }
        };

        match &outcome {
            RunOutcome::Succeeded => info!(
                elapsed = ?run_started.elapsed(),
                "✅ Provisioning run converged"
            ),
            RunOutcome::Failed { failed_nodes } => error!(
                failed = ?failed_nodes,
                "❌ Provisioning run failed"
            ),
            RunOutcome::DeadlineExceeded { elapsed } => error!(
                elapsed = ?elapsed,
                "⏰ Provisioning run exceeded its deadline"
            ),
        }

        RunReport {
            run_id: ctx.run_id,
            started_at,
            finished_at,
            outcome,
            nodes,
        }
    }

    fn apply_guards(&self, graph: &Graph, trackers: &mut HashMap<NodeId, NodeTracker>) {
        for node in graph.nodes() {
            let Some(guard) = &node.guard else { continue };
            if !guard.evaluate(&self.options.enabled_features) {
                if let Some(tracker) = trackers.get_mut(&node.id) {
                    let _ = tracker.machine.transition(&NodeEvent::Skip);
                    info!(node = %node.id, "⏭ Guard false, node skipped");
                }
            }
        }
    }

    fn schedule_ready(
        &self,
        graph: &Graph,
        order: &[NodeId],
        trackers: &mut HashMap<NodeId, NodeTracker>,
        join_set: &mut JoinSet<(NodeId, Result<Option<ResourceRef>>)>,
        task_nodes: &mut HashMap<tokio::task::Id, NodeId>,
        ctx: &Arc<RunContext>,
    ) {
        for id in order {
            if join_set.len() >= self.options.max_parallel {
                break;
            }
            if trackers[id].state() != NodeState::Pending {
                continue;
            }
            let spec = match graph.node(id) {
                Some(spec) => spec,
                None => continue,
            };
            let ready = spec
                .depends_on
                .iter()
                .all(|dep| trackers[dep].state().satisfies_dependencies());
            if !ready {
                continue;
            }

            let Some(tracker) = trackers.get_mut(id) else {
                continue;
            };
            if tracker.machine.transition(&NodeEvent::Start).is_err() {
                continue;
            }
            tracker.started = Some(Instant::now());
            info!(node = %id, "▶ Stage started");

            let action = spec.action.clone();
            let task_ctx = Arc::clone(ctx);
            let task_id = id.clone();
            let handle = join_set.spawn(async move {
                let result = action.execute(&task_ctx).await;
                (task_id, result)
            });
            task_nodes.insert(handle.id(), id.clone());
        }
    }

    fn complete_node(
        &self,
        graph: &Graph,
        trackers: &mut HashMap<NodeId, NodeTracker>,
        ctx: &Arc<RunContext>,
        id: &NodeId,
        resource: Option<ResourceRef>,
        halted: &mut bool,
    ) {
        // Publish before the status flips so dependents scheduled next see
        // the reference.
        if let Some(resource) = resource {
            if let Err(publish_error) = ctx.refs.publish(id, resource) {
                self.fail_node(graph, trackers, id, publish_error, halted);
                return;
            }
        }

        if let Some(tracker) = trackers.get_mut(id) {
            tracker.duration = tracker.started.map(|started| started.elapsed());
            let _ = tracker.machine.transition(&NodeEvent::Complete);
            info!(node = %id, duration = ?tracker.duration, "✅ Stage succeeded");
        }
    }

    fn fail_node(
        &self,
        graph: &Graph,
        trackers: &mut HashMap<NodeId, NodeTracker>,
        id: &NodeId,
        action_error: ProvisionError,
        halted: &mut bool,
    ) {
        error!(node = %id, error = %action_error, "❌ Stage failed");

        if let Some(tracker) = trackers.get_mut(id) {
            tracker.duration = tracker.started.map(|started| started.elapsed());
            let _ = tracker
                .machine
                .transition(&NodeEvent::fail(action_error.to_string()));
            tracker.error = Some(action_error);
        }

        // Every transitive dependent is failed without running; the root
        // cause is recorded so the audit names the origin.
        for descendant in graph.descendants(id) {
            if let Some(tracker) = trackers.get_mut(&descendant) {
                if tracker.state() != NodeState::Pending {
                    continue;
                }
                let dependency_error = ProvisionError::DependencyFailed {
                    node: descendant.to_string(),
                    failed_dependency: id.to_string(),
                };
                let _ = tracker
                    .machine
                    .transition(&NodeEvent::fail(dependency_error.to_string()));
                tracker.error = Some(dependency_error);
                warn!(node = %descendant, failed_dependency = %id, "Stage cancelled: dependency failed");
            }
        }

        if self.options.failure_policy == FailurePolicy::HaltAll && !*halted {
            *halted = true;
            warn!("🛑 Halting: no new stages will start; in-flight stages run to completion");
        }
    }

    fn fail_running_nodes(&self, trackers: &mut HashMap<NodeId, NodeTracker>, run_started: Instant) {
        let deadline = self.options.run_deadline.unwrap_or_default();
        for tracker in trackers.values_mut() {
            if tracker.state() == NodeState::Running {
                let deadline_error = ProvisionError::DeadlineExceeded {
                    deadline,
                    elapsed: run_started.elapsed(),
                };
                let _ = tracker
                    .machine
                    .transition(&NodeEvent::fail(deadline_error.to_string()));
                tracker.error = Some(deadline_error);
            }
        }
    }

    fn report_internal_failure(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        graph: &Graph,
        error: ProvisionError,
    ) -> RunReport {
        let nodes = graph
            .node_ids()
            .map(|id| NodeResult {
                id: id.clone(),
                state: NodeState::Pending,
                duration: None,
                error: None,
            })
            .collect();
        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcome: RunOutcome::Failed {
                failed_nodes: vec![NodeId::new(format!("internal: {error}"))],
            },
            nodes,
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(ExecutionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{Guard, NodeAction, NodeSpec};
    use crate::graph::GraphBuilder;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records execution order and optionally fails.
    struct RecordingAction {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl NodeAction for RecordingAction {
        async fn execute(&self, _ctx: &RunContext) -> Result<Option<ResourceRef>> {
            self.log.lock().push(self.name.to_string());
            if self.fail {
                Err(ProvisionError::TransientProvider {
                    operation: self.name.to_string(),
                    reason: "induced failure".to_string(),
                })
            } else {
                Ok(None)
            }
        }
    }

    fn recording(
        name: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        fail: bool,
    ) -> Arc<dyn NodeAction> {
        Arc::new(RecordingAction {
            name,
            log: log.clone(),
            fail,
        })
    }

    fn diamond(log: &Arc<Mutex<Vec<String>>>, fail_c: bool) -> Graph {
        GraphBuilder::new()
            .node(NodeSpec::new("a", recording("a", log, false)))
            .node(NodeSpec::new("b", recording("b", log, false)).depends_on(["a"]))
            .node(NodeSpec::new("c", recording("c", log, fail_c)).depends_on(["a"]))
            .node(NodeSpec::new("d", recording("d", log, false)).depends_on(["b", "c"]))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_diamond_executes_in_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = diamond(&log, false);
        let coordinator = Coordinator::default();
        let report = coordinator.run(&graph, Arc::new(RunContext::new())).await;

        assert!(report.is_success());
        let order = log.lock().clone();
        let position = |name: &str| order.iter().position(|entry| entry == name).unwrap();
        assert!(position("a") < position("b"));
        assert!(position("a") < position("c"));
        assert!(position("b") < position("d"));
        assert!(position("c") < position("d"));
    }

    #[tokio::test]
    async fn test_failed_dependency_blocks_descendants() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = diamond(&log, true);
        let coordinator = Coordinator::default();
        let report = coordinator.run(&graph, Arc::new(RunContext::new())).await;

        assert!(!report.is_success());
        assert_eq!(report.state_of(&NodeId::new("d")), Some(NodeState::Failed));
        assert!(matches!(
            report.error_of(&NodeId::new("d")),
            Some(ProvisionError::DependencyFailed { .. })
        ));
        // d's action never ran
        assert!(!log.lock().iter().any(|entry| entry == "d"));
    }

    #[tokio::test]
    async fn test_guarded_node_skips_and_satisfies_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = GraphBuilder::new()
            .node(NodeSpec::new("base", recording("base", &log, false)))
            .node(
                NodeSpec::new("mesh", recording("mesh", &log, false))
                    .depends_on(["base"])
                    .guarded_by(Guard::FeatureEnabled("mesh".to_string())),
            )
            .node(NodeSpec::new("app", recording("app", &log, false)).depends_on(["mesh"]))
            .build()
            .unwrap();

        let coordinator = Coordinator::new(ExecutionOptions {
            enabled_features: vec![],
            ..Default::default()
        });
        let report = coordinator.run(&graph, Arc::new(RunContext::new())).await;

        assert!(report.is_success());
        assert_eq!(report.state_of(&NodeId::new("mesh")), Some(NodeState::Skipped));
        assert_eq!(report.state_of(&NodeId::new("app")), Some(NodeState::Succeeded));
        assert!(!log.lock().iter().any(|entry| entry == "mesh"));
    }

    #[tokio::test]
    async fn test_halt_all_leaves_independent_nodes_pending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        // "slow" is independent of the failing chain and scheduled after it
        let graph = GraphBuilder::new()
            .node(NodeSpec::new("bad", recording("bad", &log, true)))
            .node(NodeSpec::new("after-bad", recording("after-bad", &log, false)).depends_on(["bad"]))
            .node(NodeSpec::new("island-1", recording("island-1", &log, false)))
            .node(
                NodeSpec::new("island-2", recording("island-2", &log, false))
                    .depends_on(["island-1"]),
            )
            .build()
            .unwrap();

        let coordinator = Coordinator::new(ExecutionOptions {
            max_parallel: 1,
            failure_policy: FailurePolicy::HaltAll,
            ..Default::default()
        });
        let report = coordinator.run(&graph, Arc::new(RunContext::new())).await;

        assert!(!report.is_success());
        assert_eq!(report.state_of(&NodeId::new("bad")), Some(NodeState::Failed));
        assert_eq!(
            report.state_of(&NodeId::new("after-bad")),
            Some(NodeState::Failed)
        );
        // With max_parallel=1 the failure lands before the islands start
        assert_eq!(
            report.state_of(&NodeId::new("island-2")),
            Some(NodeState::Pending)
        );
    }

    #[tokio::test]
    async fn test_continue_independent_runs_unrelated_subtrees() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = GraphBuilder::new()
            .node(NodeSpec::new("bad", recording("bad", &log, true)))
            .node(NodeSpec::new("island", recording("island", &log, false)))
            .build()
            .unwrap();

        let coordinator = Coordinator::new(ExecutionOptions {
            max_parallel: 1,
            failure_policy: FailurePolicy::ContinueIndependent,
            ..Default::default()
        });
        let report = coordinator.run(&graph, Arc::new(RunContext::new())).await;

        assert!(!report.is_success());
        assert_eq!(
            report.state_of(&NodeId::new("island")),
            Some(NodeState::Succeeded)
        );
    }

    struct SleepAction;

    #[async_trait]
    impl NodeAction for SleepAction {
        async fn execute(&self, _ctx: &RunContext) -> Result<Option<ResourceRef>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_cancels_pending_work() {
        let graph = GraphBuilder::new()
            .node(NodeSpec::new("stuck", Arc::new(SleepAction)))
            .build()
            .unwrap();

        let coordinator = Coordinator::new(ExecutionOptions {
            run_deadline: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let report = coordinator.run(&graph, Arc::new(RunContext::new())).await;

        assert!(matches!(report.outcome, RunOutcome::DeadlineExceeded { .. }));
        assert!(matches!(
            report.error_of(&NodeId::new("stuck")),
            Some(ProvisionError::DeadlineExceeded { .. })
        ));
    }

    struct PublishAction;

    #[async_trait]
    impl NodeAction for PublishAction {
        async fn execute(&self, _ctx: &RunContext) -> Result<Option<ResourceRef>> {
            Ok(Some(ResourceRef::new("vnet", "vnet-trading")))
        }
    }

    struct ConsumeAction;

    #[async_trait]
    impl NodeAction for ConsumeAction {
        async fn execute(&self, ctx: &RunContext) -> Result<Option<ResourceRef>> {
            let network = ctx.refs.require(&NodeId::new("network"))?;
            assert_eq!(network.name, "vnet-trading");
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_resource_refs_flow_to_dependents() {
        let graph = GraphBuilder::new()
            .node(NodeSpec::new("network", Arc::new(PublishAction)))
            .node(NodeSpec::new("cluster", Arc::new(ConsumeAction)).depends_on(["network"]))
            .build()
            .unwrap();

        let ctx = Arc::new(RunContext::new());
        let report = Coordinator::default().run(&graph, ctx.clone()).await;
        assert!(report.is_success());
        assert_eq!(ctx.refs.len(), 1);
    }
}
