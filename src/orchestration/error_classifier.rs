//! # Provisioning Error Classification
//!
//! Decides how a failed external call should be handled: retried under the
//! enclosing policy, or treated as node-fatal and surfaced to the operator.
//!
//! The classifier is the single place that knows which failures are worth
//! repeating. Permission problems and name collisions are never retried;
//! a transient provider error is retried until its policy is exhausted,
//! then escalated. Components receive the classifier as a strategy object
//! so alternative classifications can be injected in tests.

use crate::error::ProvisionError;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Primary error categories mirroring the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed input or configuration; requires operator intervention
    Configuration,
    /// Resource name taken by a foreign resource; operator must rename
    NameCollision,
    /// Provider rejected the call for lack of privileges
    Permission,
    /// Expected to clear on its own; retry per policy
    Transient,
    /// A readiness budget was exhausted
    ReadinessTimeout,
    /// A command retry budget was exhausted
    CommandFailed,
    /// A node action failed terminally
    StageFailed,
    /// An upstream node failed; this one never ran
    DependencyFailed,
    /// The whole-run deadline elapsed
    DeadlineExceeded,
    /// Orchestrator invariant violation
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::NameCollision => "name_collision",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Transient => "transient",
            ErrorCategory::ReadinessTimeout => "readiness_timeout",
            ErrorCategory::CommandFailed => "command_failed",
            ErrorCategory::StageFailed => "stage_failed",
            ErrorCategory::DependencyFailed => "dependency_failed",
            ErrorCategory::DeadlineExceeded => "deadline_exceeded",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

/// Result of classifying one failure at a given attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    /// Whether the enclosing loop should attempt again
    pub is_retryable: bool,
    /// Delay to wait before the next attempt, when retryable
    pub retry_delay: Option<Duration>,
    /// Whether the attempt budget is now exhausted
    pub is_final_attempt: bool,
}

/// Strategy seam for failure classification.
pub trait ErrorClassifier: Send + Sync {
    /// Classify `error` observed on 1-based attempt `attempt` under `policy`.
    fn classify(
        &self,
        error: &ProvisionError,
        attempt: u32,
        policy: &RetryPolicy,
    ) -> ErrorClassification;
}

/// Default classification: only `TransientProvider` failures are retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    fn category_of(error: &ProvisionError) -> ErrorCategory {
        match error {
            ProvisionError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            ProvisionError::NameCollision { .. } => ErrorCategory::NameCollision,
            ProvisionError::PermissionDenied { .. } => ErrorCategory::Permission,
            ProvisionError::TransientProvider { .. } => ErrorCategory::Transient,
            ProvisionError::ReadinessTimeout { .. } => ErrorCategory::ReadinessTimeout,
            ProvisionError::CommandFailed { .. } => ErrorCategory::CommandFailed,
            ProvisionError::StageFailed { .. } => ErrorCategory::StageFailed,
            ProvisionError::DependencyFailed { .. } => ErrorCategory::DependencyFailed,
            ProvisionError::DeadlineExceeded { .. } => ErrorCategory::DeadlineExceeded,
            ProvisionError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify(
        &self,
        error: &ProvisionError,
        attempt: u32,
        policy: &RetryPolicy,
    ) -> ErrorClassification {
        let category = Self::category_of(error);
        let budget_remaining = policy.allows_retry(attempt);
        let is_retryable = category == ErrorCategory::Transient && budget_remaining;

        ErrorClassification {
            category,
            is_retryable,
            retry_delay: is_retryable.then(|| policy.delay_after(attempt)),
            is_final_attempt: !budget_remaining,
        }
    }
}
