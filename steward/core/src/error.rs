//! Error Taxonomy
//!
//! Every failure a feature handler can raise is a [`StewardError`]. The router
//! catches them at its boundary and turns them into a user-visible
//! acknowledgment via [`StewardError::to_reply`]; nothing propagates far enough
//! to take down other in-flight interactions.
//!
//! Best-effort side operations (adding a member to a thread, for example) are
//! a separate category: they go through [`best_effort`], which logs and
//! discards the failure.

use std::fmt::Display;
use std::future::Future;

use thiserror::Error;

use crate::messages::Reply;
use crate::platform::PlatformError;
use crate::store::StoreError;

/// Result alias used throughout the core
pub type StewardResult<T> = Result<T, StewardError>;

/// Errors raised by feature handlers and core components
#[derive(Debug, Error)]
pub enum StewardError {
    /// A recorded message or thread id no longer resolves
    #[error("stale reference: {0}")]
    StaleReference(String),

    /// Malformed user-supplied input; nothing was mutated
    #[error("invalid input: {0}")]
    Validation(String),

    /// The actor lacks a required role or administrative capability
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The blob store read or write failed
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// No handler is registered for the action token
    #[error("no handler for action '{token}'")]
    UnroutedAction {
        /// The raw token that failed to route
        token: String,
    },

    /// A platform call failed outright
    #[error("platform call failed: {0}")]
    Platform(#[from] PlatformError),

    /// A failure while serving a follow-up interaction (a selection claimed
    /// by a listening window); it is answered on that interaction
    #[error("{source} (follow-up {interaction_id})")]
    FollowUp {
        /// The follow-up interaction that gets the acknowledgment
        interaction_id: String,
        /// What went wrong
        source: Box<StewardError>,
    },
}

/// Coarse classification used for logging and dispatch outcomes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recovered by recreation, normally never surfaced
    StaleReference,
    /// Bad user input
    Validation,
    /// Missing role or capability
    PermissionDenied,
    /// Blob store failure (retryable)
    Storage,
    /// No handler
    Unrouted,
    /// Platform failure (retryable)
    Platform,
    /// A handler panicked
    Internal,
}

impl ErrorCategory {
    /// Whether retrying the whole operation may succeed
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Storage | Self::Platform | Self::StaleReference)
    }
}

impl StewardError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a permission failure
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    /// Attach this failure to the follow-up interaction `interaction_id`
    #[must_use]
    pub fn in_follow_up(self, interaction_id: impl Into<String>) -> Self {
        match self {
            follow_up @ Self::FollowUp { .. } => follow_up,
            other => Self::FollowUp {
                interaction_id: interaction_id.into(),
                source: Box::new(other),
            },
        }
    }

    /// The follow-up interaction this failure must be answered on, if any
    #[must_use]
    pub fn follow_up_interaction(&self) -> Option<&str> {
        match self {
            Self::FollowUp { interaction_id, .. } => Some(interaction_id),
            _ => None,
        }
    }

    /// Classify this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FollowUp { source, .. } => source.category(),
            Self::StaleReference(_) => ErrorCategory::StaleReference,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::UnroutedAction { .. } => ErrorCategory::Unrouted,
            Self::Platform(_) => ErrorCategory::Platform,
        }
    }

    /// Convert into the acknowledgment shown to the initiating user
    ///
    /// Validation and permission messages are shown verbatim; infrastructure
    /// failures get a generic retry hint so internals never leak to users.
    #[must_use]
    pub fn to_reply(&self) -> Reply {
        match self {
            Self::FollowUp { source, .. } => source.to_reply(),
            Self::Validation(msg) => Reply::failure(msg.clone(), false),
            Self::PermissionDenied(msg) => Reply::failure(msg.clone(), false),
            Self::UnroutedAction { .. } => Reply::NotImplemented,
            Self::Storage(_) | Self::Platform(_) | Self::StaleReference(_) => Reply::failure(
                "Something went wrong while saving. Please try again.",
                true,
            ),
        }
    }
}

/// Run a side operation whose failure must never abort the primary one
///
/// Returns `Some(value)` on success. On failure the error is logged at `warn`
/// with `label` and `None` is returned.
pub async fn best_effort<F, T, E>(label: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation = label, error = %e, "Best-effort operation failed");
            None
        }
    }
}
