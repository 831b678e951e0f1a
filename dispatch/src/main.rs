//! Roadcall demo: drive one request through its whole lifecycle.
//!
//! Runs the dispatch engine with a JSON file repository and shortened
//! simulator timings, so the full pending → accepted → inProgress →
//! completed chain plays out in a few seconds of wall time.

use roadcall_dispatch::{
    DispatchConfig, DispatchEngine, DispatchEnvironment, JsonFileRepository, Location, Role,
    ServiceKind,
    environment::SessionIdentity,
    types::ActorId,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Short timings so the demo finishes quickly; production defaults come
    // from ROADCALL_* variables.
    let config = DispatchConfig {
        accept_delay: Duration::from_secs(2),
        progress_delay: Duration::from_secs(3),
        command_latency: Duration::from_millis(200),
        ..DispatchConfig::from_env()
    };

    let identity = Arc::new(SessionIdentity::new());
    identity.login(ActorId::new("demo-user"), Role::Requester);

    let data_dir = std::env::temp_dir().join("roadcall-demo");
    let repository = Arc::new(JsonFileRepository::new(&data_dir, &config.namespace));
    tracing::info!(path = %repository.path().display(), "Using request document");

    let environment = DispatchEnvironment::builder()
        .identity(identity)
        .repository(repository)
        .config(config)
        .build();

    let engine = DispatchEngine::open(environment).await?;

    let id = engine
        .create_request(
            ServiceKind::Towing,
            "Car won't start, parked on the shoulder".to_string(),
            Location::new(48.8566, 2.3522).with_address("Quai de la Tournelle, Paris"),
        )
        .await?;
    tracing::info!(request = %id, "Created service request");

    // Let the simulated dispatch accept and start the work
    tokio::time::sleep(Duration::from_secs(6)).await;

    if let Some(request) = engine.get_request(id).await {
        tracing::info!(
            status = %request.status,
            provider = ?request.provider_id,
            eta = ?request.estimated_arrival,
            "Request after simulated dispatch"
        );
    }

    engine.complete_request(id).await?;

    for request in engine.all_requests().await {
        tracing::info!(
            request = %request.id,
            status = %request.status,
            kind = %request.kind,
            "Final state"
        );
    }

    engine.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
