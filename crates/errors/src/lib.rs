//! Common errors shared across Fleetcore crates.
//!
//! Each condition gets its own `thiserror` type rather than one catch-all enum, following the
//! convention of naming the failure instead of a generic "internal error" string. Every error
//! also implements [`ErrorKind::of`] so an (out of scope) API layer can map it to a transport
//! status code without this crate depending on any transport.

/// Coarse error taxonomy from the error handling design.
///
/// NotFound maps to HTTP 404, Conflict to 409, ValidationFailed to 400, everything else to 500
/// at whatever external boundary eventually surfaces these errors -- none of that mapping lives
/// in this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailed,
    LockFailure,
    DriverFailure,
    Timeout,
    Cancelled,
    Internal,
}

/// Implemented by every error type in this crate to expose its [`ErrorKind`].
pub trait ErrorClass: std::error::Error {
    fn kind(&self) -> ErrorKind;
}

/// A requested entity does not exist (or is soft-deleted and `show_deleted` was not set).
#[derive(Debug, thiserror::Error)]
#[error("{entity} '{id}' not found")]
pub struct NotFound {
    pub entity: &'static str,
    pub id: String,
}

impl NotFound {
    pub fn new<S: Into<String>>(entity: &'static str, id: S) -> Self {
        NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl ErrorClass for NotFound {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NotFound
    }
}

/// A uniqueness or mutual-exclusion invariant would be violated.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Conflict(pub String);

impl ErrorClass for Conflict {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Conflict
    }
}

/// A policy of the same type is already attached to the cluster.
#[derive(Debug, thiserror::Error)]
#[error("a policy of type '{policy_type}' is already attached to cluster '{cluster_id}'")]
pub struct PolicyTypeConflict {
    pub cluster_id: String,
    pub policy_type: String,
}

impl ErrorClass for PolicyTypeConflict {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Conflict
    }
}

/// User supplied input failed validation (schema, type, or semantic check).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationFailed(pub String);

impl ErrorClass for ValidationFailed {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationFailed
    }
}

/// A node's profile type does not match its cluster's profile type.
#[derive(Debug, thiserror::Error)]
#[error("profile type '{node_type}' does not match cluster profile type '{cluster_type}'")]
pub struct ProfileTypeMismatch {
    pub cluster_type: String,
    pub node_type: String,
}

impl ErrorClass for ProfileTypeMismatch {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationFailed
    }
}

/// A cluster or node scope lock could not be acquired.
#[derive(Debug, thiserror::Error)]
#[error("failed locking {scope} '{resource_id}'")]
pub struct LockFailure {
    pub resource_id: String,
    pub scope: &'static str,
}

impl ErrorClass for LockFailure {
    fn kind(&self) -> ErrorKind {
        ErrorKind::LockFailure
    }
}

/// A profile or policy plugin reported a failure.
#[derive(Debug, thiserror::Error)]
#[error("driver failure for {subject}: {reason}")]
pub struct DriverFailure {
    pub subject: String,
    pub reason: String,
}

impl ErrorClass for DriverFailure {
    fn kind(&self) -> ErrorKind {
        ErrorKind::DriverFailure
    }
}

/// A driver returned a status word whose verb did not match the action that requested it.
#[derive(Debug, thiserror::Error)]
#[error("driver reported verb '{observed}' but '{expected}' was expected")]
pub struct DriverVerbMismatch {
    pub expected: String,
    pub observed: String,
}

impl ErrorClass for DriverVerbMismatch {
    fn kind(&self) -> ErrorKind {
        ErrorKind::DriverFailure
    }
}

/// An action exceeded its configured timeout while waiting on dependents.
#[derive(Debug, thiserror::Error)]
#[error("action '{action_id}' timed out after {timeout_secs}s")]
pub struct Timeout {
    pub action_id: String,
    pub timeout_secs: u64,
}

impl ErrorClass for Timeout {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Timeout
    }
}

/// An action was cancelled, either explicitly or via forced lock preemption.
#[derive(Debug, thiserror::Error)]
#[error("action '{action_id}' cancelled: {reason}")]
pub struct Cancelled {
    pub action_id: String,
    pub reason: String,
}

impl ErrorClass for Cancelled {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Cancelled
    }
}

/// An invariant the engine relies on was violated; this should never be user-triggerable.
#[derive(Debug, thiserror::Error)]
#[error("internal invariant violated: {0}")]
pub struct Internal(pub String);

impl ErrorClass for Internal {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// `add_dependency` would introduce a cycle in the action dependency graph.
#[derive(Debug, thiserror::Error)]
#[error("action '{child_id}' cannot depend on '{parent_id}': would introduce a cycle")]
pub struct DependencyCycle {
    pub child_id: String,
    pub parent_id: String,
}

impl ErrorClass for DependencyCycle {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// An action status transition was requested that the state machine does not allow.
#[derive(Debug, thiserror::Error)]
#[error("action '{action_id}' cannot transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub action_id: String,
    pub from: String,
    pub to: String,
}

impl ErrorClass for InvalidTransition {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}
