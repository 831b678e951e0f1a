//! Error taxonomy for dispatch operations.

use crate::lifecycle::TransitionKind;
use crate::types::{RequestId, RequestStatus};
use thiserror::Error;

/// Errors produced by dispatch commands and lifecycle transitions
///
/// The variants are cloneable and comparable so they can travel inside
/// outcome actions through the broadcast channel back to waiting callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No actor is signed in
    #[error("authentication required")]
    AuthRequired,

    /// A command carried an invalid field
    #[error("validation failed: {0}")]
    Validation(String),

    /// No request exists with this id
    #[error("service request {0} not found")]
    NotFound(RequestId),

    /// The request's current status does not permit this transition
    #[error("cannot {action} request {id}: status is {from}")]
    InvalidTransition {
        /// The request being transitioned
        id: RequestId,
        /// Its status at the time of the attempt
        from: RequestStatus,
        /// The transition that was attempted
        action: TransitionKind,
    },

    /// A request with this id already exists
    #[error("service request {0} already exists")]
    DuplicateId(RequestId),

    /// The current position could not be determined
    #[error("position unavailable: {0}")]
    Position(String),

    /// The engine failed internally (runtime timeout, channel closure)
    #[error("dispatch engine failure: {0}")]
    Engine(String),
}
