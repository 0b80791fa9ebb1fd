//! Shared orchestration types: execution options and the run audit report.

use crate::error::ProvisionError;
use crate::graph::node::NodeId;
use crate::state_machine::NodeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// What the coordinator does with nodes unrelated to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failure stops all new scheduling; in-flight siblings finish.
    /// Matches the reference workflow's halt-on-first-failure behavior.
    HaltAll,
    /// Subtrees with no path from the failed node keep executing.
    ContinueIndependent,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::HaltAll
    }
}

/// Coordinator tuning for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Upper bound on concurrently running nodes. 1 reproduces strictly
    /// sequential execution.
    pub max_parallel: usize,
    pub failure_policy: FailurePolicy,
    /// Whole-run budget; when exceeded, pending polls are cancelled and the
    /// run fails with `DeadlineExceeded`.
    pub run_deadline: Option<Duration>,
    /// Feature toggles, resolved once before scheduling starts
    pub enabled_features: Vec<String>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            failure_policy: FailurePolicy::default(),
            run_deadline: None,
            enabled_features: Vec::new(),
        }
    }
}

/// Terminal record for one node in the audit report.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub id: NodeId,
    pub state: NodeState,
    /// Wall-clock action time; `None` for nodes that never ran
    pub duration: Option<Duration>,
    pub error: Option<ProvisionError>,
}

/// Overall disposition of one orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded,
    Failed { failed_nodes: Vec<NodeId> },
    DeadlineExceeded { elapsed: Duration },
}

/// Audit output for one run: per-node terminal status (distinguishing
/// skipped from executed) plus the graph-wide outcome.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    /// Node results in declaration order
    pub nodes: Vec<NodeResult>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded)
    }

    pub fn state_of(&self, id: &NodeId) -> Option<NodeState> {
        self.nodes
            .iter()
            .find(|node| &node.id == id)
            .map(|node| node.state)
    }

    pub fn error_of(&self, id: &NodeId) -> Option<&ProvisionError> {
        self.nodes
            .iter()
            .find(|node| &node.id == id)
            .and_then(|node| node.error.as_ref())
    }

    pub fn failed_nodes(&self) -> Vec<&NodeResult> {
        self.nodes
            .iter()
            .filter(|node| node.state == NodeState::Failed)
            .collect()
    }

    pub fn skipped_nodes(&self) -> Vec<&NodeResult> {
        self.nodes
            .iter()
            .filter(|node| node.state == NodeState::Skipped)
            .collect()
    }

    /// One line per node, suitable for operator output.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let detail = match &node.error {
                Some(error) => format!("  ({error})"),
                None => String::new(),
            };
            out.push_str(&format!("{:<40} {:>10}{}\n", node.id, node.state.to_string(), detail));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_default_is_halt_all() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::HaltAll);
    }

    #[test]
    fn test_execution_options_defaults() {
        let options = ExecutionOptions::default();
        assert_eq!(options.max_parallel, 4);
        assert!(options.run_deadline.is_none());
        assert!(options.enabled_features.is_empty());
    }

    #[test]
    fn test_report_lookups() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome: RunOutcome::Succeeded,
            nodes: vec![NodeResult {
                id: NodeId::new("network"),
                state: NodeState::Succeeded,
                duration: Some(Duration::from_secs(3)),
                error: None,
            }],
        };
        assert!(report.is_success());
        assert_eq!(
            report.state_of(&NodeId::new("network")),
            Some(NodeState::Succeeded)
        );
        assert!(report.state_of(&NodeId::new("missing")).is_none());
    }
}
