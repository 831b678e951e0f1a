//! Domain types for the service-request lifecycle.
//!
//! The central type is [`ServiceRequest`], a record that moves through the
//! [`RequestStatus`] state machine. [`DispatchState`] holds every request
//! (newest first) plus secondary indices that enforce the at-most-one
//! active request rule per requester and per provider.

use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an actor (requester or provider)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    /// Create an actor id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Correlation token tying a command to its outcome action
///
/// Commands carry a fresh correlation id; the reducer echoes it on the
/// outcome action so concurrent commands on the same request cannot be
/// confused with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub Uuid);

/// The side of the marketplace an actor acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Someone asking for roadside assistance
    Requester,
    /// Someone providing roadside assistance
    Provider,
}

/// Category of roadside service being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Vehicle towing
    Towing,
    /// Fuel delivery
    Fuel,
    /// Flat tire change
    Tire,
    /// Battery jump start
    Battery,
    /// Vehicle lockout
    Lockout,
    /// Medical assistance
    Medical,
    /// Anything else
    Other,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Towing => "towing",
            Self::Fuel => "fuel",
            Self::Tire => "tire",
            Self::Battery => "battery",
            Self::Lockout => "lockout",
            Self::Medical => "medical",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Geographic position where service is needed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Optional human-readable address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    /// Create a location from coordinates
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
        }
    }

    /// Attach a human-readable address
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Status of a service request
///
/// Legal transitions:
///
/// ```text
/// pending → accepted → inProgress → completed
/// pending → cancelled
/// accepted → cancelled
/// ```
///
/// `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestStatus {
    /// Created, waiting for a provider
    Pending,
    /// A provider has committed and is en route
    Accepted,
    /// The provider is working on site
    InProgress,
    /// Work finished successfully (terminal)
    Completed,
    /// Withdrawn before work started (terminal)
    Cancelled,
}

impl RequestStatus {
    /// Whether this status admits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A service request record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    /// Unique id
    pub id: RequestId,
    /// Actor who created the request
    pub requester_id: ActorId,
    /// Category of service needed
    pub kind: ServiceKind,
    /// Free-text description of the problem
    pub description: String,
    /// Where service is needed
    pub location: Location,
    /// Current lifecycle status
    pub status: RequestStatus,
    /// Assigned provider; `Some` exactly when status is accepted,
    /// inProgress, or completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ActorId>,
    /// Provider's estimated arrival; `Some` exactly when status is
    /// accepted or inProgress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
    /// When the request was created
    pub created_at: DateTime<Utc>,
    /// When the request last changed
    pub updated_at: DateTime<Utc>,
}

/// In-memory dispatch state: all requests plus activity indices
///
/// Requests are kept newest first, matching the order they are shown and
/// persisted. The indices map each actor to their single active (non-
/// terminal) request and are maintained on every mutation, so the
/// one-active-request rule is checked in O(1) at transition time.
#[derive(Debug, Clone, Default)]
pub struct DispatchState {
    requests: Vec<ServiceRequest>,
    active_by_requester: HashMap<ActorId, RequestId>,
    active_by_provider: HashMap<ActorId, RequestId>,
}

impl DispatchState {
    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from a persisted snapshot (newest first)
    ///
    /// Index entries follow store order, so if a corrupt snapshot holds two
    /// active requests for one actor, the newest wins the index slot.
    #[must_use]
    pub fn from_records(records: Vec<ServiceRequest>) -> Self {
        let mut active_by_requester = HashMap::new();
        let mut active_by_provider = HashMap::new();

        for request in &records {
            if request.status.is_terminal() {
                continue;
            }
            active_by_requester
                .entry(request.requester_id.clone())
                .or_insert(request.id);
            if let Some(provider) = &request.provider_id {
                active_by_provider.entry(provider.clone()).or_insert(request.id);
            }
        }

        Self {
            requests: records,
            active_by_requester,
            active_by_provider,
        }
    }

    /// Snapshot of all requests, newest first
    #[must_use]
    pub fn records(&self) -> Vec<ServiceRequest> {
        self.requests.clone()
    }

    /// Number of stored requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the state holds no requests
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Look up a request by id
    #[must_use]
    pub fn get(&self, id: RequestId) -> Option<&ServiceRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// All requests matching a predicate, newest first
    pub fn query<'a>(
        &'a self,
        predicate: impl Fn(&ServiceRequest) -> bool + 'a,
    ) -> impl Iterator<Item = &'a ServiceRequest> {
        self.requests.iter().filter(move |r| predicate(r))
    }

    /// The single active (non-terminal) request for an actor, if any
    #[must_use]
    pub fn active_request(&self, actor: &ActorId, role: Role) -> Option<&ServiceRequest> {
        let index = match role {
            Role::Requester => &self.active_by_requester,
            Role::Provider => &self.active_by_provider,
        };
        index.get(actor).and_then(|id| self.get(*id))
    }

    /// All requests involving an actor in the given role, newest first
    #[must_use]
    pub fn list_for(&self, actor: &ActorId, role: Role) -> Vec<&ServiceRequest> {
        let actor = actor.clone();
        self.query(move |r| match role {
            Role::Requester => r.requester_id == actor,
            Role::Provider => r.provider_id.as_ref() == Some(&actor),
        })
        .collect()
    }

    /// Insert a new request at the front (newest first)
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateId`] if a request with this id
    /// already exists.
    pub fn append(&mut self, request: ServiceRequest) -> Result<(), DispatchError> {
        if self.get(request.id).is_some() {
            return Err(DispatchError::DuplicateId(request.id));
        }
        self.index(&request);
        self.requests.insert(0, request);
        Ok(())
    }

    /// Replace a request via a fallible transform, maintaining indices
    ///
    /// The closure receives the current record and returns its successor.
    /// On success the record is swapped in place and both activity indices
    /// are updated to match the new status and provider assignment.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotFound`] if no request has this id, or
    /// whatever error the transform returns.
    pub fn patch(
        &mut self,
        id: RequestId,
        transform: impl FnOnce(&ServiceRequest) -> Result<ServiceRequest, DispatchError>,
    ) -> Result<&ServiceRequest, DispatchError> {
        let position = self
            .requests
            .iter()
            .position(|r| r.id == id)
            .ok_or(DispatchError::NotFound(id))?;

        let updated = transform(&self.requests[position])?;
        let previous = std::mem::replace(&mut self.requests[position], updated.clone());

        self.unindex(&previous);
        self.index(&updated);

        Ok(&self.requests[position])
    }

    fn index(&mut self, request: &ServiceRequest) {
        if request.status.is_terminal() {
            return;
        }
        self.active_by_requester
            .insert(request.requester_id.clone(), request.id);
        if let Some(provider) = &request.provider_id {
            self.active_by_provider.insert(provider.clone(), request.id);
        }
    }

    fn unindex(&mut self, request: &ServiceRequest) {
        if self.active_by_requester.get(&request.requester_id) == Some(&request.id) {
            self.active_by_requester.remove(&request.requester_id);
        }
        if let Some(provider) = &request.provider_id {
            if self.active_by_provider.get(provider) == Some(&request.id) {
                self.active_by_provider.remove(provider);
            }
        }
    }
}
