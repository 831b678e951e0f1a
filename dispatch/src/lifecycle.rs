//! Pure lifecycle transitions for service requests.
//!
//! Every status change goes through one of these functions, whether it was
//! commanded by an actor or fired by the dispatch simulator. They take the
//! current record and a timestamp and return the successor record, so the
//! state machine rules live in exactly one place and are trivially testable
//! without a runtime.

use crate::error::DispatchError;
use crate::types::{
    ActorId, Location, RequestId, RequestStatus, ServiceKind, ServiceRequest,
};
use chrono::{DateTime, Utc};
use std::fmt;

/// The transition an actor or the simulator attempted
///
/// Carried inside [`DispatchError::InvalidTransition`] so error messages
/// name what was attempted, not just what state blocked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// pending → accepted
    Accept,
    /// accepted → inProgress
    Progress,
    /// inProgress → completed
    Complete,
    /// pending/accepted → cancelled
    Cancel,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Accept => "accept",
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        };
        f.write_str(label)
    }
}

/// Build a fresh pending request
///
/// # Errors
///
/// Returns [`DispatchError::Validation`] if the description is blank or the
/// coordinates are outside their valid ranges.
pub fn create(
    id: RequestId,
    requester_id: ActorId,
    kind: ServiceKind,
    description: String,
    location: Location,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, DispatchError> {
    if description.trim().is_empty() {
        return Err(DispatchError::Validation(
            "description must not be empty".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&location.latitude) {
        return Err(DispatchError::Validation(format!(
            "latitude {} out of range",
            location.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&location.longitude) {
        return Err(DispatchError::Validation(format!(
            "longitude {} out of range",
            location.longitude
        )));
    }

    Ok(ServiceRequest {
        id,
        requester_id,
        kind,
        description,
        location,
        status: RequestStatus::Pending,
        provider_id: None,
        estimated_arrival: None,
        created_at: now,
        updated_at: now,
    })
}

/// pending → accepted: a provider commits with an arrival estimate
///
/// # Errors
///
/// Returns [`DispatchError::Validation`] for a zero ETA and
/// [`DispatchError::InvalidTransition`] if the request is not pending.
pub fn accept(
    request: &ServiceRequest,
    provider_id: ActorId,
    eta_minutes: u32,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, DispatchError> {
    if eta_minutes == 0 {
        return Err(DispatchError::Validation(
            "estimated arrival must be at least one minute".to_string(),
        ));
    }
    if request.status != RequestStatus::Pending {
        return Err(DispatchError::InvalidTransition {
            id: request.id,
            from: request.status,
            action: TransitionKind::Accept,
        });
    }

    let mut next = request.clone();
    next.status = RequestStatus::Accepted;
    next.provider_id = Some(provider_id);
    next.estimated_arrival = Some(now + chrono::Duration::minutes(i64::from(eta_minutes)));
    next.updated_at = now;
    Ok(next)
}

/// accepted → inProgress: the provider has arrived and started work
///
/// # Errors
///
/// Returns [`DispatchError::InvalidTransition`] if the request is not
/// accepted.
pub fn progress(
    request: &ServiceRequest,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, DispatchError> {
    if request.status != RequestStatus::Accepted {
        return Err(DispatchError::InvalidTransition {
            id: request.id,
            from: request.status,
            action: TransitionKind::Progress,
        });
    }

    let mut next = request.clone();
    next.status = RequestStatus::InProgress;
    next.updated_at = now;
    Ok(next)
}

/// inProgress → completed: work finished
///
/// The arrival estimate is cleared; it has no meaning on a closed request.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidTransition`] if the request is not in
/// progress.
pub fn complete(
    request: &ServiceRequest,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, DispatchError> {
    if request.status != RequestStatus::InProgress {
        return Err(DispatchError::InvalidTransition {
            id: request.id,
            from: request.status,
            action: TransitionKind::Complete,
        });
    }

    let mut next = request.clone();
    next.status = RequestStatus::Completed;
    next.estimated_arrival = None;
    next.updated_at = now;
    Ok(next)
}

/// pending/accepted → cancelled: the requester withdraws
///
/// Any provider assignment and arrival estimate are cleared so the record
/// keeps the invariant that only assigned, open requests carry them.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidTransition`] once work is in progress or
/// the request is already closed.
pub fn cancel(
    request: &ServiceRequest,
    now: DateTime<Utc>,
) -> Result<ServiceRequest, DispatchError> {
    if !matches!(
        request.status,
        RequestStatus::Pending | RequestStatus::Accepted
    ) {
        return Err(DispatchError::InvalidTransition {
            id: request.id,
            from: request.status,
            action: TransitionKind::Cancel,
        });
    }

    let mut next = request.clone();
    next.status = RequestStatus::Cancelled;
    next.provider_id = None;
    next.estimated_arrival = None;
    next.updated_at = now;
    Ok(next)
}
