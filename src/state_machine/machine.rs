use super::errors::{StateMachineError, StateMachineResult};
use super::events::NodeEvent;
use super::states::NodeState;

/// In-memory state machine for a single provisioning node.
///
/// Transitions are validated against the allowed set before being applied;
/// the owning coordinator is the only writer, so no synchronization happens
/// here.
#[derive(Debug, Clone)]
pub struct NodeStateMachine {
    node: String,
    state: NodeState,
}

impl NodeStateMachine {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            state: NodeState::default(),
        }
    }

    pub fn current_state(&self) -> NodeState {
        self.state
    }

    /// Apply an event, moving to the target state if the transition is legal.
    pub fn transition(&mut self, event: &NodeEvent) -> StateMachineResult<NodeState> {
        if self.state.is_terminal() {
            return Err(StateMachineError::AlreadyTerminal {
                node: self.node.clone(),
                state: self.state.to_string(),
            });
        }
        let target = determine_target_state(self.state, event)?;
        self.state = target;
        Ok(target)
    }
}

/// Pure transition function shared by the state machine and its tests.
pub fn determine_target_state(
    current: NodeState,
    event: &NodeEvent,
) -> StateMachineResult<NodeState> {
    let target = match (current, event) {
        (NodeState::Pending, NodeEvent::Start) => NodeState::Running,

        // Guard pruning happens before the node ever runs
        (NodeState::Pending, NodeEvent::Skip) => NodeState::Skipped,

        (NodeState::Running, NodeEvent::Complete) => NodeState::Succeeded,
        (NodeState::Running, NodeEvent::Fail(_)) => NodeState::Failed,

        // A dependency failure marks the node failed without it ever starting
        (NodeState::Pending, NodeEvent::Fail(_)) => NodeState::Failed,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: format!("{event:?}"),
            })
        }
    };

    Ok(target)
}
