//! The dispatch engine: async facade over the store.
//!
//! [`DispatchEngine`] owns the store and turns the action/outcome protocol
//! into ordinary async methods returning `Result`. Each command gets a
//! fresh correlation id; the engine waits on the action broadcast for the
//! outcome carrying that id, so concurrent commands on the same request
//! never pick up each other's results.

use crate::actions::DispatchAction;
use crate::environment::DispatchEnvironment;
use crate::error::DispatchError;
use crate::reducer::DispatchReducer;
use crate::types::{
    ActorId, CorrelationId, DispatchState, Location, RequestId, Role, ServiceKind, ServiceRequest,
};
use roadcall_runtime::Store;
use std::time::Duration;

type DispatchStore = Store<DispatchState, DispatchAction, DispatchEnvironment, DispatchReducer>;

/// Async facade over the dispatch store
///
/// Cloning shares the underlying store and environment.
#[derive(Clone)]
pub struct DispatchEngine {
    store: DispatchStore,
    environment: DispatchEnvironment,
}

impl DispatchEngine {
    /// Open the engine: load the persisted document and start the store
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Engine`] if the persisted document cannot
    /// be loaded.
    pub async fn open(environment: DispatchEnvironment) -> Result<Self, DispatchError> {
        let records = environment
            .repository()
            .load_all()
            .await
            .map_err(|error| DispatchError::Engine(error.to_string()))?;

        tracing::info!(count = records.len(), "Opening dispatch engine");

        let state = DispatchState::from_records(records);
        let store = Store::new(state, DispatchReducer::new(), environment.clone());

        Ok(Self { store, environment })
    }

    /// Create a service request for the signed-in actor
    ///
    /// Returns the id of the new request once the command is acknowledged.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AuthRequired`] when nobody is signed in
    /// - [`DispatchError::Validation`] for a blank description, bad
    ///   coordinates, or an already-active request
    pub async fn create_request(
        &self,
        kind: ServiceKind,
        description: String,
        location: Location,
    ) -> Result<RequestId, DispatchError> {
        let (requester, _) = self.signed_in_actor()?;
        let id = RequestId(self.environment.ids().new_id());
        let correlation = CorrelationId(self.environment.ids().new_id());

        self.run_command(
            correlation,
            DispatchAction::CreateRequest {
                correlation,
                id,
                requester,
                kind,
                description,
                location,
            },
        )
        .await?;

        Ok(id)
    }

    /// Create a service request at the device's current position
    ///
    /// # Errors
    ///
    /// As [`Self::create_request`], plus [`DispatchError::Position`] when
    /// no position is available.
    pub async fn create_request_here(
        &self,
        kind: ServiceKind,
        description: String,
    ) -> Result<RequestId, DispatchError> {
        let (latitude, longitude) = self.environment.coordinates().current_position()?;
        self.create_request(kind, description, Location::new(latitude, longitude))
            .await
    }

    /// Cancel a pending or accepted request
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AuthRequired`] when nobody is signed in
    /// - [`DispatchError::NotFound`] for an unknown id
    /// - [`DispatchError::InvalidTransition`] once work started or the
    ///   request is closed
    pub async fn cancel_request(&self, id: RequestId) -> Result<(), DispatchError> {
        self.signed_in_actor()?;
        let correlation = CorrelationId(self.environment.ids().new_id());
        self.run_command(correlation, DispatchAction::CancelRequest { correlation, id })
            .await
    }

    /// Accept a pending request as the signed-in provider
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AuthRequired`] when nobody is signed in
    /// - [`DispatchError::Validation`] when the actor is not a provider,
    ///   the ETA is zero, or the provider already has an assignment
    /// - [`DispatchError::NotFound`] / [`DispatchError::InvalidTransition`]
    ///   per the lifecycle rules
    pub async fn accept_request(
        &self,
        id: RequestId,
        eta_minutes: u32,
    ) -> Result<(), DispatchError> {
        let (provider, role) = self.signed_in_actor()?;
        if role != Role::Provider {
            return Err(DispatchError::Validation(
                "only providers can accept requests".to_string(),
            ));
        }

        let correlation = CorrelationId(self.environment.ids().new_id());
        self.run_command(
            correlation,
            DispatchAction::AcceptRequest {
                correlation,
                id,
                provider,
                eta_minutes,
            },
        )
        .await
    }

    /// Complete an in-progress request
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AuthRequired`] when nobody is signed in
    /// - [`DispatchError::NotFound`] / [`DispatchError::InvalidTransition`]
    ///   per the lifecycle rules
    pub async fn complete_request(&self, id: RequestId) -> Result<(), DispatchError> {
        self.signed_in_actor()?;
        let correlation = CorrelationId(self.environment.ids().new_id());
        self.run_command(
            correlation,
            DispatchAction::CompleteRequest { correlation, id },
        )
        .await
    }

    /// The actor's single active (non-terminal) request, if any
    pub async fn active_request(&self, actor: &ActorId, role: Role) -> Option<ServiceRequest> {
        let actor = actor.clone();
        self.store
            .state(move |s| s.active_request(&actor, role).cloned())
            .await
    }

    /// Every request involving the actor in the given role, newest first
    pub async fn list_requests(&self, actor: &ActorId, role: Role) -> Vec<ServiceRequest> {
        let actor = actor.clone();
        self.store
            .state(move |s| s.list_for(&actor, role).into_iter().cloned().collect())
            .await
    }

    /// Look up one request by id
    pub async fn get_request(&self, id: RequestId) -> Option<ServiceRequest> {
        self.store.state(move |s| s.get(id).cloned()).await
    }

    /// Snapshot of every request, newest first
    pub async fn all_requests(&self) -> Vec<ServiceRequest> {
        self.store.state(DispatchState::records).await
    }

    /// Gracefully shut down, waiting for in-flight effects
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Engine`] if effects are still running when
    /// the timeout expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.store
            .shutdown(timeout)
            .await
            .map_err(|error| DispatchError::Engine(error.to_string()))
    }

    fn signed_in_actor(&self) -> Result<(ActorId, Role), DispatchError> {
        self.environment
            .identity()
            .current_actor()
            .ok_or(DispatchError::AuthRequired)
    }

    /// Send a command and wait for its correlated outcome
    ///
    /// The configured command latency is applied first, approximating the
    /// round trip the original client experienced.
    async fn run_command(
        &self,
        correlation: CorrelationId,
        action: DispatchAction,
    ) -> Result<(), DispatchError> {
        let config = self.environment.config();
        if !config.command_latency.is_zero() {
            tokio::time::sleep(config.command_latency).await;
        }

        let outcome = self
            .store
            .send_and_wait_for(
                action,
                move |candidate| {
                    matches!(
                        candidate,
                        DispatchAction::CommandSucceeded { correlation: c }
                        | DispatchAction::CommandFailed { correlation: c, .. }
                            if *c == correlation
                    )
                },
                config.command_timeout,
            )
            .await
            .map_err(|error| DispatchError::Engine(error.to_string()))?;

        match outcome {
            DispatchAction::CommandSucceeded { .. } => Ok(()),
            DispatchAction::CommandFailed { error, .. } => Err(error),
            other => Err(DispatchError::Engine(format!(
                "unexpected outcome action: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
