//! The dispatch reducer: all state changes in one place.
//!
//! Commands and simulator transitions alike funnel through
//! [`DispatchReducer::reduce`], executed under the store's write lock. That
//! single funnel is what makes the simulated dispatch safe: a delayed
//! `SimulateAccept` that fires after the requester cancelled finds the
//! request no longer pending and drops, because its guard is evaluated
//! against current state, not the state at scheduling time.

use crate::actions::DispatchAction;
use crate::environment::DispatchEnvironment;
use crate::error::DispatchError;
use crate::lifecycle;
use crate::notify::Notification;
use crate::types::{
    ActorId, CorrelationId, DispatchState, Location, RequestId, RequestStatus, Role, ServiceKind,
};
use rand::Rng;
use roadcall_core::{SmallVec, effect::Effect, reducer::Reducer};
use smallvec::smallvec;

/// Reducer for the service-request lifecycle
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchReducer;

impl DispatchReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for DispatchReducer {
    type State = DispatchState;
    type Action = DispatchAction;
    type Environment = DispatchEnvironment;

    fn reduce(
        &self,
        state: &mut DispatchState,
        action: DispatchAction,
        env: &DispatchEnvironment,
    ) -> SmallVec<[Effect<DispatchAction>; 4]> {
        match action {
            DispatchAction::CreateRequest {
                correlation,
                id,
                requester,
                kind,
                description,
                location,
            } => create_request(
                state,
                env,
                correlation,
                id,
                requester,
                kind,
                description,
                location,
            ),

            DispatchAction::CancelRequest { correlation, id } => {
                let now = env.clock().now();
                match state.patch(id, |r| lifecycle::cancel(r, now)) {
                    Ok(_) => {
                        tracing::info!(request = %id, "Request cancelled");
                        smallvec![
                            acknowledged(env, correlation, Notification::request_cancelled()),
                            persist(state, env),
                        ]
                    },
                    Err(error) => rejection(env, correlation, error),
                }
            },

            DispatchAction::AcceptRequest {
                correlation,
                id,
                provider,
                eta_minutes,
            } => accept_request(state, env, correlation, id, provider, eta_minutes),

            DispatchAction::CompleteRequest { correlation, id } => {
                let now = env.clock().now();
                match state.patch(id, |r| lifecycle::complete(r, now)) {
                    Ok(_) => {
                        tracing::info!(request = %id, "Request completed");
                        smallvec![
                            acknowledged(env, correlation, Notification::request_completed()),
                            persist(state, env),
                        ]
                    },
                    Err(error) => rejection(env, correlation, error),
                }
            },

            DispatchAction::SimulateAccept { id } => simulate_accept(state, env, id),

            DispatchAction::SimulateProgress { id } => simulate_progress(state, env, id),

            // Outcomes exist for the broadcast channel only
            DispatchAction::CommandSucceeded { .. } | DispatchAction::CommandFailed { .. } => {
                SmallVec::new()
            },
        }
    }
}

#[allow(clippy::too_many_arguments)] // Mirrors the action's fields
fn create_request(
    state: &mut DispatchState,
    env: &DispatchEnvironment,
    correlation: CorrelationId,
    id: RequestId,
    requester: ActorId,
    kind: ServiceKind,
    description: String,
    location: Location,
) -> SmallVec<[Effect<DispatchAction>; 4]> {
    if let Some(active) = state.active_request(&requester, Role::Requester) {
        let error = DispatchError::Validation(format!(
            "requester already has an active request ({})",
            active.id
        ));
        return rejection(env, correlation, error);
    }

    let now = env.clock().now();
    let request = match lifecycle::create(id, requester, kind, description, location, now) {
        Ok(request) => request,
        Err(error) => return rejection(env, correlation, error),
    };

    if let Err(error) = state.append(request) {
        return rejection(env, correlation, error);
    }

    tracing::info!(request = %id, %kind, "Request created");

    let mut effects: SmallVec<[Effect<DispatchAction>; 4]> = smallvec![
        acknowledged(env, correlation, Notification::request_created(kind)),
        persist(state, env),
    ];
    if env.config().simulate_dispatch {
        effects.push(Effect::delay(
            env.config().accept_delay,
            DispatchAction::SimulateAccept { id },
        ));
    }
    effects
}

fn accept_request(
    state: &mut DispatchState,
    env: &DispatchEnvironment,
    correlation: CorrelationId,
    id: RequestId,
    provider: ActorId,
    eta_minutes: u32,
) -> SmallVec<[Effect<DispatchAction>; 4]> {
    if let Some(active) = state.active_request(&provider, Role::Provider) {
        let error = DispatchError::Validation(format!(
            "provider already has an active assignment ({})",
            active.id
        ));
        return rejection(env, correlation, error);
    }

    let now = env.clock().now();
    let provider_label = provider.clone();
    match state.patch(id, |r| lifecycle::accept(r, provider, eta_minutes, now)) {
        Ok(_) => {
            tracing::info!(request = %id, provider = %provider_label, eta_minutes, "Request accepted");
            let mut effects: SmallVec<[Effect<DispatchAction>; 4]> = smallvec![
                acknowledged(env, correlation, Notification::request_accepted(eta_minutes)),
                persist(state, env),
            ];
            if env.config().simulate_dispatch {
                effects.push(Effect::delay(
                    env.config().progress_delay,
                    DispatchAction::SimulateProgress { id },
                ));
            }
            effects
        },
        Err(error) => rejection(env, correlation, error),
    }
}

/// Simulated provider acceptance, fired by a delayed effect
///
/// Re-validates every guard against current state and drops silently when
/// the request is no longer pending or the simulated provider is busy.
fn simulate_accept(
    state: &mut DispatchState,
    env: &DispatchEnvironment,
    id: RequestId,
) -> SmallVec<[Effect<DispatchAction>; 4]> {
    let config = env.config();
    let provider = ActorId::new(config.simulated_provider.clone());

    match state.get(id) {
        Some(request) if request.status == RequestStatus::Pending => {},
        found => {
            tracing::debug!(
                request = %id,
                status = ?found.map(|r| r.status),
                "Simulated accept dropped, request no longer pending"
            );
            return SmallVec::new();
        },
    }
    if state.active_request(&provider, Role::Provider).is_some() {
        tracing::debug!(request = %id, "Simulated accept dropped, provider busy");
        return SmallVec::new();
    }

    let (min, max) = (config.eta_min_minutes, config.eta_max_minutes.max(config.eta_min_minutes));
    let eta_minutes = rand::thread_rng().gen_range(min..=max);
    let now = env.clock().now();

    match state.patch(id, |r| lifecycle::accept(r, provider, eta_minutes, now)) {
        Ok(_) => {
            tracing::info!(request = %id, eta_minutes, "Simulated provider accepted request");
            let notifier = env.notifier();
            smallvec![
                Effect::future(async move {
                    notifier.notify(Notification::request_accepted(eta_minutes));
                    None::<DispatchAction>
                }),
                persist(state, env),
                Effect::delay(
                    config.progress_delay,
                    DispatchAction::SimulateProgress { id },
                ),
            ]
        },
        Err(error) => {
            tracing::debug!(request = %id, %error, "Simulated accept dropped");
            SmallVec::new()
        },
    }
}

fn simulate_progress(
    state: &mut DispatchState,
    env: &DispatchEnvironment,
    id: RequestId,
) -> SmallVec<[Effect<DispatchAction>; 4]> {
    match state.get(id) {
        Some(request) if request.status == RequestStatus::Accepted => {},
        found => {
            tracing::debug!(
                request = %id,
                status = ?found.map(|r| r.status),
                "Simulated progress dropped, request no longer accepted"
            );
            return SmallVec::new();
        },
    }

    let now = env.clock().now();
    match state.patch(id, |r| lifecycle::progress(r, now)) {
        Ok(_) => {
            tracing::info!(request = %id, "Service in progress");
            let notifier = env.notifier();
            smallvec![
                Effect::future(async move {
                    notifier.notify(Notification::service_in_progress());
                    None::<DispatchAction>
                }),
                persist(state, env),
            ]
        },
        Err(error) => {
            tracing::debug!(request = %id, %error, "Simulated progress dropped");
            SmallVec::new()
        },
    }
}

/// Success effect: deliver the notification, then answer the caller
fn acknowledged(
    env: &DispatchEnvironment,
    correlation: CorrelationId,
    notification: Notification,
) -> Effect<DispatchAction> {
    let notifier = env.notifier();
    Effect::future(async move {
        notifier.notify(notification);
        Some(DispatchAction::CommandSucceeded { correlation })
    })
}

/// Failure effect: warn the user, then answer the caller with the error
///
/// State is never mutated on the rejection path; the caller's snapshot of
/// the world stays consistent with what persisted.
fn rejection(
    env: &DispatchEnvironment,
    correlation: CorrelationId,
    error: DispatchError,
) -> SmallVec<[Effect<DispatchAction>; 4]> {
    tracing::warn!(%error, "Command rejected");
    let notifier = env.notifier();
    smallvec![Effect::future(async move {
        notifier.notify(Notification::command_failed(&error));
        Some(DispatchAction::CommandFailed { correlation, error })
    })]
}

/// Persist the full request document as a fire-and-forget effect
///
/// A persistence failure is logged, never surfaced to the actor; in-memory
/// state remains authoritative for the session.
fn persist(state: &DispatchState, env: &DispatchEnvironment) -> Effect<DispatchAction> {
    let records = state.records();
    let repository = env.repository();
    Effect::future(async move {
        if let Err(error) = repository.persist_all(records).await {
            tracing::error!(%error, "Failed to persist request document");
        }
        None
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::types::{Location, ServiceKind, ServiceRequest};
    use roadcall_testing::{ReducerTest, assertions, test_clock};
    use roadcall_core::environment::Clock;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_env() -> DispatchEnvironment {
        DispatchEnvironment::builder()
            .clock(Arc::new(test_clock()))
            .config(DispatchConfig {
                command_latency: Duration::ZERO,
                ..DispatchConfig::default()
            })
            .build()
    }

    fn correlation(n: u128) -> CorrelationId {
        CorrelationId(Uuid::from_u128(n))
    }

    fn request_id(n: u128) -> RequestId {
        RequestId(Uuid::from_u128(n))
    }

    fn pending_request(n: u128, requester: &str) -> ServiceRequest {
        lifecycle::create(
            request_id(n),
            ActorId::new(requester),
            ServiceKind::Towing,
            "flat tire".to_string(),
            Location::new(48.85, 2.35),
            test_clock().now(),
        )
        .unwrap()
    }

    fn state_with(requests: Vec<ServiceRequest>) -> DispatchState {
        let mut state = DispatchState::new();
        for request in requests.into_iter().rev() {
            state.append(request).unwrap();
        }
        state
    }

    #[test]
    fn create_appends_pending_and_schedules_simulated_accept() {
        let id = request_id(1);
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(DispatchState::new())
            .when_action(DispatchAction::CreateRequest {
                correlation: correlation(1),
                id,
                requester: ActorId::new("u1"),
                kind: ServiceKind::Battery,
                description: "dead battery".to_string(),
                location: Location::new(1.0, 2.0),
            })
            .then_state(move |state| {
                let request = state.get(id).unwrap();
                assert_eq!(request.status, RequestStatus::Pending);
                assert_eq!(request.created_at, test_clock().now());
                assert!(request.provider_id.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 3);
                assertions::assert_has_delay_effect(effects);
                assert_eq!(
                    assertions::delay_durations(effects),
                    vec![Duration::from_secs(10)]
                );
            })
            .run();
    }

    #[test]
    fn create_without_simulation_skips_the_delay() {
        let env = DispatchEnvironment::builder()
            .clock(Arc::new(test_clock()))
            .config(DispatchConfig {
                simulate_dispatch: false,
                ..DispatchConfig::default()
            })
            .build();

        ReducerTest::new(DispatchReducer::new())
            .with_env(env)
            .given_state(DispatchState::new())
            .when_action(DispatchAction::CreateRequest {
                correlation: correlation(1),
                id: request_id(1),
                requester: ActorId::new("u1"),
                kind: ServiceKind::Fuel,
                description: "out of fuel".to_string(),
                location: Location::new(1.0, 2.0),
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assert!(assertions::delay_durations(effects).is_empty());
            })
            .run();
    }

    #[test]
    fn create_rejects_second_active_request_for_same_requester() {
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state_with(vec![pending_request(1, "u1")]))
            .when_action(DispatchAction::CreateRequest {
                correlation: correlation(2),
                id: request_id(2),
                requester: ActorId::new("u1"),
                kind: ServiceKind::Tire,
                description: "second problem".to_string(),
                location: Location::new(1.0, 2.0),
            })
            .then_state(|state| {
                assert_eq!(state.len(), 1);
            })
            .then_effects(|effects| {
                // Only the rejection outcome, no persist, no dispatch chain
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn create_with_blank_description_leaves_state_untouched() {
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(DispatchState::new())
            .when_action(DispatchAction::CreateRequest {
                correlation: correlation(1),
                id: request_id(1),
                requester: ActorId::new("u1"),
                kind: ServiceKind::Other,
                description: "  ".to_string(),
                location: Location::new(1.0, 2.0),
            })
            .then_state(|state| assert!(state.is_empty()))
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn accept_sets_exact_eta_from_the_clock() {
        let id = request_id(1);
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state_with(vec![pending_request(1, "u1")]))
            .when_action(DispatchAction::AcceptRequest {
                correlation: correlation(1),
                id,
                provider: ActorId::new("p1"),
                eta_minutes: 10,
            })
            .then_state(move |state| {
                let request = state.get(id).unwrap();
                assert_eq!(request.status, RequestStatus::Accepted);
                assert_eq!(request.provider_id, Some(ActorId::new("p1")));
                assert_eq!(
                    request.estimated_arrival,
                    Some(test_clock().now() + chrono::Duration::minutes(10))
                );
            })
            .then_effects(|effects| {
                assert_eq!(
                    assertions::delay_durations(effects),
                    vec![Duration::from_secs(15)]
                );
            })
            .run();
    }

    #[test]
    fn double_accept_is_rejected_without_mutation() {
        let id = request_id(1);
        let mut state = state_with(vec![pending_request(1, "u1")]);
        let now = test_clock().now();
        state
            .patch(id, |r| lifecycle::accept(r, ActorId::new("p1"), 10, now))
            .unwrap();

        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(DispatchAction::AcceptRequest {
                correlation: correlation(2),
                id,
                provider: ActorId::new("p2"),
                eta_minutes: 5,
            })
            .then_state(move |state| {
                let request = state.get(id).unwrap();
                assert_eq!(request.provider_id, Some(ActorId::new("p1")));
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn busy_provider_cannot_accept_a_second_request() {
        let id_one = request_id(1);
        let mut state = state_with(vec![
            pending_request(1, "u1"),
            pending_request(2, "u2"),
        ]);
        let now = test_clock().now();
        state
            .patch(id_one, |r| lifecycle::accept(r, ActorId::new("p1"), 10, now))
            .unwrap();

        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(DispatchAction::AcceptRequest {
                correlation: correlation(3),
                id: request_id(2),
                provider: ActorId::new("p1"),
                eta_minutes: 5,
            })
            .then_state(|state| {
                assert_eq!(state.get(request_id(2)).unwrap().status, RequestStatus::Pending);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn cancel_of_unknown_id_is_rejected_not_ignored() {
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(DispatchState::new())
            .when_action(DispatchAction::CancelRequest {
                correlation: correlation(1),
                id: request_id(404),
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn complete_requires_in_progress() {
        let id = request_id(1);
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state_with(vec![pending_request(1, "u1")]))
            .when_action(DispatchAction::CompleteRequest {
                correlation: correlation(1),
                id,
            })
            .then_state(move |state| {
                assert_eq!(state.get(id).unwrap().status, RequestStatus::Pending);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn simulated_accept_assigns_configured_provider_with_bounded_eta() {
        let id = request_id(1);
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state_with(vec![pending_request(1, "u1")]))
            .when_action(DispatchAction::SimulateAccept { id })
            .then_state(move |state| {
                let request = state.get(id).unwrap();
                assert_eq!(request.status, RequestStatus::Accepted);
                assert_eq!(request.provider_id, Some(ActorId::new("provider-123")));

                let eta = request.estimated_arrival.unwrap() - test_clock().now();
                assert!(eta >= chrono::Duration::minutes(5));
                assert!(eta <= chrono::Duration::minutes(20));
            })
            .then_effects(|effects| {
                assert_eq!(
                    assertions::delay_durations(effects),
                    vec![Duration::from_secs(15)]
                );
            })
            .run();
    }

    #[test]
    fn simulated_accept_after_cancel_drops_silently() {
        let id = request_id(1);
        let mut state = state_with(vec![pending_request(1, "u1")]);
        state
            .patch(id, |r| lifecycle::cancel(r, test_clock().now()))
            .unwrap();

        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(DispatchAction::SimulateAccept { id })
            .then_state(move |state| {
                assert_eq!(state.get(id).unwrap().status, RequestStatus::Cancelled);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn simulated_progress_requires_accepted() {
        let id = request_id(1);
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(state_with(vec![pending_request(1, "u1")]))
            .when_action(DispatchAction::SimulateProgress { id })
            .then_state(move |state| {
                assert_eq!(state.get(id).unwrap().status, RequestStatus::Pending);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn outcome_actions_are_inert() {
        ReducerTest::new(DispatchReducer::new())
            .with_env(test_env())
            .given_state(DispatchState::new())
            .when_action(DispatchAction::CommandSucceeded {
                correlation: correlation(9),
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
