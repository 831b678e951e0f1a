//! End-to-end tests for the dispatch engine.
//!
//! These run on a paused tokio clock: `tokio::time::sleep` auto-advances
//! virtual time, so the 10s/15s simulator delays fire instantly and
//! deterministically.

#![allow(clippy::unwrap_used)] // Test code

use roadcall_core::environment::Clock;
use roadcall_dispatch::environment::{IdentityProvider, SessionIdentity, StaticIdentity};
use roadcall_dispatch::notify::{NotificationSink, RecordingSink};
use roadcall_dispatch::{
    DispatchConfig, DispatchEngine, DispatchEnvironment, DispatchError, InMemoryRepository,
    JsonFileRepository, Location, RequestRepository, RequestStatus, Role, ServiceKind,
    types::ActorId,
};
use roadcall_testing::{SequentialIdGenerator, test_clock};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    engine: DispatchEngine,
    session: Arc<SessionIdentity>,
    sink: Arc<RecordingSink>,
}

async fn harness(config: DispatchConfig, repository: Arc<dyn RequestRepository>) -> Harness {
    let session = Arc::new(SessionIdentity::new());
    let sink = Arc::new(RecordingSink::new());

    let environment = DispatchEnvironment::builder()
        .clock(Arc::new(test_clock()))
        .ids(Arc::new(SequentialIdGenerator::new()))
        .identity(Arc::clone(&session) as Arc<dyn IdentityProvider>)
        .notifier(Arc::clone(&sink) as Arc<dyn NotificationSink>)
        .repository(repository)
        .config(config)
        .build();

    Harness {
        engine: DispatchEngine::open(environment).await.unwrap(),
        session,
        sink,
    }
}

fn instant_commands() -> DispatchConfig {
    DispatchConfig {
        command_latency: Duration::ZERO,
        ..DispatchConfig::default()
    }
}

fn no_simulation() -> DispatchConfig {
    DispatchConfig {
        simulate_dispatch: false,
        ..instant_commands()
    }
}

#[tokio::test(start_paused = true)]
async fn simulated_dispatch_advances_through_accepted_and_in_progress() {
    let h = harness(instant_commands(), Arc::new(InMemoryRepository::new())).await;
    h.session.login(ActorId::new("u1"), Role::Requester);

    let id = h
        .engine
        .create_request(
            ServiceKind::Towing,
            "engine smoke".to_string(),
            Location::new(48.85, 2.35),
        )
        .await
        .unwrap();

    assert_eq!(
        h.engine.get_request(id).await.unwrap().status,
        RequestStatus::Pending
    );

    // Provider accepts after 10 virtual seconds
    tokio::time::sleep(Duration::from_secs(11)).await;
    let accepted = h.engine.get_request(id).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert_eq!(accepted.provider_id, Some(ActorId::new("provider-123")));
    assert!(accepted.estimated_arrival.is_some());

    // Work starts 15 virtual seconds after acceptance
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(
        h.engine.get_request(id).await.unwrap().status,
        RequestStatus::InProgress
    );

    h.engine.complete_request(id).await.unwrap();
    let done = h.engine.get_request(id).await.unwrap();
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.estimated_arrival, None);

    // Completed requests are no longer anyone's active request
    assert!(h
        .engine
        .active_request(&ActorId::new("u1"), Role::Requester)
        .await
        .is_none());
    assert!(h
        .engine
        .active_request(&ActorId::new("provider-123"), Role::Provider)
        .await
        .is_none());

    let titles: Vec<String> = h.sink.delivered().into_iter().map(|n| n.title).collect();
    assert_eq!(
        titles,
        vec![
            "Service Request Created",
            "Request Accepted",
            "Service In Progress",
            "Service Completed",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_wins_over_pending_simulated_accept() {
    let h = harness(instant_commands(), Arc::new(InMemoryRepository::new())).await;
    h.session.login(ActorId::new("u1"), Role::Requester);

    let id = h
        .engine
        .create_request(
            ServiceKind::Fuel,
            "ran dry".to_string(),
            Location::new(1.0, 2.0),
        )
        .await
        .unwrap();

    // Cancel before the 10s simulated accept fires
    h.engine.cancel_request(id).await.unwrap();

    // Let the stale simulator timers fire; they must find a cancelled
    // request and drop
    tokio::time::sleep(Duration::from_secs(30)).await;

    let request = h.engine.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Cancelled);
    assert_eq!(request.provider_id, None);

    let titles: Vec<String> = h.sink.delivered().into_iter().map(|n| n.title).collect();
    assert!(!titles.iter().any(|t| t == "Request Accepted"));
    assert!(titles.iter().any(|t| t == "Request Cancelled"));
}

#[tokio::test(start_paused = true)]
async fn manual_accept_uses_exact_eta_and_blocks_a_second_provider() {
    let h = harness(no_simulation(), Arc::new(InMemoryRepository::new())).await;
    h.session.login(ActorId::new("u1"), Role::Requester);

    let id = h
        .engine
        .create_request(
            ServiceKind::Tire,
            "blowout".to_string(),
            Location::new(1.0, 2.0),
        )
        .await
        .unwrap();

    h.session.login(ActorId::new("p1"), Role::Provider);
    h.engine.accept_request(id, 12).await.unwrap();

    let accepted = h.engine.get_request(id).await.unwrap();
    assert_eq!(accepted.provider_id, Some(ActorId::new("p1")));
    assert_eq!(
        accepted.estimated_arrival,
        Some(test_clock().now() + chrono::Duration::minutes(12))
    );

    // Second provider arrives too late
    h.session.login(ActorId::new("p2"), Role::Provider);
    let err = h.engine.accept_request(id, 5).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InvalidTransition {
            from: RequestStatus::Accepted,
            ..
        }
    ));

    // The loser's attempt changed nothing
    assert_eq!(
        h.engine.get_request(id).await.unwrap().provider_id,
        Some(ActorId::new("p1"))
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_commands_receive_their_own_outcomes() {
    let h = harness(no_simulation(), Arc::new(InMemoryRepository::new())).await;
    h.session.login(ActorId::new("u1"), Role::Requester);

    let id = h
        .engine
        .create_request(
            ServiceKind::Lockout,
            "keys inside".to_string(),
            Location::new(1.0, 2.0),
        )
        .await
        .unwrap();

    let unknown = roadcall_dispatch::types::RequestId(uuid::Uuid::from_u128(0xdead));

    let (cancel_ok, cancel_unknown) =
        tokio::join!(h.engine.cancel_request(id), h.engine.cancel_request(unknown));

    assert!(cancel_ok.is_ok());
    assert_eq!(cancel_unknown.unwrap_err(), DispatchError::NotFound(unknown));
}

#[tokio::test(start_paused = true)]
async fn requesters_cannot_accept_and_signed_out_actors_cannot_command() {
    let h = harness(no_simulation(), Arc::new(InMemoryRepository::new())).await;

    // Signed out entirely
    let err = h
        .engine
        .create_request(
            ServiceKind::Other,
            "help".to_string(),
            Location::new(0.0, 0.0),
        )
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::AuthRequired);

    h.session.login(ActorId::new("u1"), Role::Requester);
    let id = h
        .engine
        .create_request(
            ServiceKind::Other,
            "help".to_string(),
            Location::new(0.0, 0.0),
        )
        .await
        .unwrap();

    // Still signed in as a requester
    let err = h.engine.accept_request(id, 10).await.unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn second_active_request_is_rejected_until_first_closes() {
    let h = harness(no_simulation(), Arc::new(InMemoryRepository::new())).await;
    h.session.login(ActorId::new("u1"), Role::Requester);

    let first = h
        .engine
        .create_request(
            ServiceKind::Battery,
            "dead battery".to_string(),
            Location::new(1.0, 2.0),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .create_request(
            ServiceKind::Towing,
            "also need a tow".to_string(),
            Location::new(1.0, 2.0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    h.engine.cancel_request(first).await.unwrap();

    // Closed now, a fresh request goes through
    let second = h
        .engine
        .create_request(
            ServiceKind::Towing,
            "also need a tow".to_string(),
            Location::new(1.0, 2.0),
        )
        .await
        .unwrap();
    assert_eq!(
        h.engine
            .active_request(&ActorId::new("u1"), Role::Requester)
            .await
            .map(|r| r.id),
        Some(second)
    );
}

#[tokio::test(start_paused = true)]
async fn document_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let repository = Arc::new(JsonFileRepository::new(dir.path(), "roadcall-requests"));

    let id = {
        let h = harness(
            no_simulation(),
            Arc::clone(&repository) as Arc<dyn RequestRepository>,
        )
        .await;
        h.session.login(ActorId::new("u1"), Role::Requester);

        let id = h
            .engine
            .create_request(
                ServiceKind::Medical,
                "minor injury".to_string(),
                Location::new(1.0, 2.0),
            )
            .await
            .unwrap();

        h.session.login(ActorId::new("p1"), Role::Provider);
        h.engine.accept_request(id, 7).await.unwrap();

        h.engine.shutdown(Duration::from_secs(5)).await.unwrap();
        id
    };

    // Fresh engine over the same document
    let h = harness(no_simulation(), repository).await;

    let restored = h.engine.get_request(id).await.unwrap();
    assert_eq!(restored.status, RequestStatus::Accepted);
    assert_eq!(restored.provider_id, Some(ActorId::new("p1")));
    assert_eq!(
        restored.estimated_arrival,
        Some(test_clock().now() + chrono::Duration::minutes(7))
    );

    // Activity indices are rebuilt from the document
    assert_eq!(
        h.engine
            .active_request(&ActorId::new("p1"), Role::Provider)
            .await
            .map(|r| r.id),
        Some(id)
    );
}

#[tokio::test(start_paused = true)]
async fn create_request_here_uses_the_coordinate_source() {
    let session = Arc::new(StaticIdentity::new(ActorId::new("u1"), Role::Requester));
    let environment = DispatchEnvironment::builder()
        .clock(Arc::new(test_clock()))
        .coordinates(Arc::new(
            roadcall_dispatch::environment::FixedPosition::new(40.7, -74.0),
        ))
        .identity(session)
        .config(no_simulation())
        .build();
    let engine = DispatchEngine::open(environment).await.unwrap();

    let id = engine
        .create_request_here(ServiceKind::Towing, "stranded".to_string())
        .await
        .unwrap();

    let request = engine.get_request(id).await.unwrap();
    assert!((request.location.latitude - 40.7).abs() < f64::EPSILON);
    assert!((request.location.longitude - (-74.0)).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn position_failure_surfaces_before_any_command_is_sent() {
    let h = harness(no_simulation(), Arc::new(InMemoryRepository::new())).await;
    h.session.login(ActorId::new("u1"), Role::Requester);

    let err = h
        .engine
        .create_request_here(ServiceKind::Fuel, "empty tank".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Position(_)));
    assert!(h.engine.all_requests().await.is_empty());
}
