//! Service-request lifecycle and dispatch engine.
//!
//! Roadcall connects requesters to roadside service providers. This crate
//! implements the part with real invariants: the state machine governing a
//! service request from creation through assignment, progress, and closure,
//! together with the simulated asynchronous dispatch process that assigns
//! providers and advances state without explicit user action.
//!
//! # Architecture
//!
//! ```text
//! Actor command → DispatchEngine
//!                  ↓
//!                  Store serializes reducer execution
//!                  ↓
//! DispatchReducer validates the transition (pure lifecycle rules)
//!                  ↓
//! Effects: notify sink, persist document, schedule simulated dispatch
//!                  ↓
//! Effect::Delay fires → same reducer path → guard re-checked against
//! current state → applied or dropped silently
//! ```
//!
//! The dispatch simulator is nothing more than delayed actions re-entering
//! the same reducer: every scheduled transition re-validates its guard at
//! fire time, so a cancelled request is never resurrected by a stale task.
//!
//! # Quick Start
//!
//! ```no_run
//! use roadcall_dispatch::{
//!     DispatchConfig, DispatchEngine, DispatchEnvironment, Location, Role, ServiceKind,
//!     environment::SessionIdentity,
//! };
//! use roadcall_dispatch::types::ActorId;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = Arc::new(SessionIdentity::new());
//! identity.login(ActorId::new("u1"), Role::Requester);
//!
//! let env = DispatchEnvironment::builder()
//!     .identity(identity)
//!     .config(DispatchConfig::default())
//!     .build();
//!
//! let engine = DispatchEngine::open(env).await?;
//! let id = engine
//!     .create_request(
//!         ServiceKind::Towing,
//!         "flat tire".to_string(),
//!         Location::new(12.34, 56.78),
//!     )
//!     .await?;
//!
//! let active = engine.active_request(&ActorId::new("u1"), Role::Requester).await;
//! assert_eq!(active.map(|r| r.id), Some(id));
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod reducer;
pub mod repository;
pub mod types;

// Re-export commonly used types
pub use actions::DispatchAction;
pub use config::DispatchConfig;
pub use engine::DispatchEngine;
pub use environment::DispatchEnvironment;
pub use error::DispatchError;
pub use notify::{Notification, NotificationSink, Severity};
pub use reducer::DispatchReducer;
pub use repository::{InMemoryRepository, JsonFileRepository, RequestRepository};
pub use types::{
    ActorId, DispatchState, Location, RequestId, RequestStatus, Role, ServiceKind, ServiceRequest,
};
