//! Injected dependencies for the dispatch reducer and engine.
//!
//! Everything with an external edge lives behind a trait here: time, id
//! generation, the signed-in actor, device position, notification delivery,
//! and persistence. Production and tests differ only in which
//! implementations the [`DispatchEnvironment`] builder wires in.

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::notify::{NotificationSink, TracingNotificationSink};
use crate::repository::{InMemoryRepository, RequestRepository};
use crate::types::{ActorId, Role};
use roadcall_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use std::sync::{Arc, RwLock};

/// Who is currently signed in
pub trait IdentityProvider: Send + Sync {
    /// The signed-in actor and their role, or `None` when signed out
    fn current_actor(&self) -> Option<(ActorId, Role)>;
}

/// Identity provider fixed at construction time
///
/// Handy for tests and single-actor tools where nobody signs in or out.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    actor: ActorId,
    role: Role,
}

impl StaticIdentity {
    /// Always report this actor as signed in
    #[must_use]
    pub const fn new(actor: ActorId, role: Role) -> Self {
        Self { actor, role }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Option<(ActorId, Role)> {
        Some((self.actor.clone(), self.role))
    }
}

/// Mutable sign-in session
///
/// Starts signed out; `login` and `logout` flip the session from any
/// thread.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    session: RwLock<Option<(ActorId, Role)>>,
}

impl SessionIdentity {
    /// Create a signed-out session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign an actor in, replacing any previous session
    pub fn login(&self, actor: ActorId, role: Role) {
        if let Ok(mut session) = self.session.write() {
            *session = Some((actor, role));
        }
    }

    /// Sign out
    pub fn logout(&self) {
        if let Ok(mut session) = self.session.write() {
            *session = None;
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_actor(&self) -> Option<(ActorId, Role)> {
        self.session.read().ok().and_then(|session| session.clone())
    }
}

/// Where the device currently is
pub trait CoordinateSource: Send + Sync {
    /// Current `(latitude, longitude)`
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Position`] when no position is available.
    fn current_position(&self) -> Result<(f64, f64), DispatchError>;
}

/// Coordinate source pinned to one position
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    latitude: f64,
    longitude: f64,
}

impl FixedPosition {
    /// Always report this position
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl CoordinateSource for FixedPosition {
    fn current_position(&self) -> Result<(f64, f64), DispatchError> {
        Ok((self.latitude, self.longitude))
    }
}

/// Coordinate source that never has a fix
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPosition;

impl CoordinateSource for NoPosition {
    fn current_position(&self) -> Result<(f64, f64), DispatchError> {
        Err(DispatchError::Position(
            "no position source available".to_string(),
        ))
    }
}

/// All injected dependencies for dispatch, plus configuration
///
/// Cloning is cheap: trait objects are shared behind `Arc`s.
#[derive(Clone)]
pub struct DispatchEnvironment {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    identity: Arc<dyn IdentityProvider>,
    coordinates: Arc<dyn CoordinateSource>,
    notifier: Arc<dyn NotificationSink>,
    repository: Arc<dyn RequestRepository>,
    config: DispatchConfig,
}

impl DispatchEnvironment {
    /// Start building an environment from production defaults
    #[must_use]
    pub fn builder() -> DispatchEnvironmentBuilder {
        DispatchEnvironmentBuilder::default()
    }

    /// The injected clock
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The injected id generator
    #[must_use]
    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    /// The injected identity provider
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// The injected coordinate source
    #[must_use]
    pub fn coordinates(&self) -> &dyn CoordinateSource {
        self.coordinates.as_ref()
    }

    /// Shared handle to the notification sink (clone to move into effects)
    #[must_use]
    pub fn notifier(&self) -> Arc<dyn NotificationSink> {
        Arc::clone(&self.notifier)
    }

    /// Shared handle to the repository (clone to move into effects)
    #[must_use]
    pub fn repository(&self) -> Arc<dyn RequestRepository> {
        Arc::clone(&self.repository)
    }

    /// The dispatch configuration
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl std::fmt::Debug for DispatchEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DispatchEnvironment`]
///
/// Unset slots fall back to production defaults: system clock, random
/// UUIDs, signed-out session, no position source, logging notifications,
/// in-memory repository, default config.
#[derive(Default)]
pub struct DispatchEnvironmentBuilder {
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    coordinates: Option<Arc<dyn CoordinateSource>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    repository: Option<Arc<dyn RequestRepository>>,
    config: Option<DispatchConfig>,
}

impl DispatchEnvironmentBuilder {
    /// Use this clock
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this id generator
    #[must_use]
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Use this identity provider
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use this coordinate source
    #[must_use]
    pub fn coordinates(mut self, coordinates: Arc<dyn CoordinateSource>) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Use this notification sink
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use this repository
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn RequestRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Use this configuration
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> DispatchEnvironment {
        DispatchEnvironment {
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidGenerator)),
            identity: self
                .identity
                .unwrap_or_else(|| Arc::new(SessionIdentity::new())),
            coordinates: self.coordinates.unwrap_or_else(|| Arc::new(NoPosition)),
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingNotificationSink)),
            repository: self
                .repository
                .unwrap_or_else(|| Arc::new(InMemoryRepository::new())),
            config: self.config.unwrap_or_default(),
        }
    }
}
