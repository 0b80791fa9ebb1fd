//! # Resilience Primitives
//!
//! Retry policies shared by every component that talks to an external
//! control plane. Classification of which failures are worth retrying
//! lives in [`crate::orchestration::error_classifier`].

pub mod retry;

pub use retry::{BackoffStrategy, RetryPolicy};
