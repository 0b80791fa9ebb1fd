use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    /// The requested transition is not in the allowed set
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Attempted to transition a node that is already terminal
    #[error("Node {node} is already terminal in state {state}")]
    AlreadyTerminal { node: String, state: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for crate::error::ProvisionError {
    fn from(error: StateMachineError) -> Self {
        crate::error::ProvisionError::Internal(error.to_string())
    }
}
