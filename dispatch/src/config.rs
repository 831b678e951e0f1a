//! Configuration for the dispatch engine.

use std::time::Duration;

/// Tunable knobs for dispatch behavior
///
/// Defaults match production behavior; tests typically zero out
/// `command_latency` and drive the delays with a paused runtime clock.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long the simulator waits before a provider accepts a pending
    /// request
    pub accept_delay: Duration,
    /// How long after acceptance the simulator moves work to inProgress
    pub progress_delay: Duration,
    /// Artificial latency applied to every command before it reaches the
    /// reducer, approximating a network round trip
    pub command_latency: Duration,
    /// How long a caller waits for a command's outcome before giving up
    pub command_timeout: Duration,
    /// Lower bound (inclusive) of the simulated arrival estimate
    pub eta_min_minutes: u32,
    /// Upper bound (inclusive) of the simulated arrival estimate
    pub eta_max_minutes: u32,
    /// Provider id the simulator assigns to accepted requests
    pub simulated_provider: String,
    /// Key namespace for the persisted request document
    pub namespace: String,
    /// Whether creating a request schedules the simulated dispatch chain
    pub simulate_dispatch: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            accept_delay: Duration::from_secs(10),
            progress_delay: Duration::from_secs(15),
            command_latency: Duration::from_secs(1),
            command_timeout: Duration::from_secs(10),
            eta_min_minutes: 5,
            eta_max_minutes: 20,
            simulated_provider: "provider-123".to_string(),
            namespace: "roadcall-requests".to_string(),
            simulate_dispatch: true,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from `ROADCALL_*` environment variables
    ///
    /// Unset or unparseable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            accept_delay: env_duration_secs("ROADCALL_ACCEPT_DELAY_SECS", defaults.accept_delay),
            progress_delay: env_duration_secs(
                "ROADCALL_PROGRESS_DELAY_SECS",
                defaults.progress_delay,
            ),
            command_latency: env_duration_millis(
                "ROADCALL_COMMAND_LATENCY_MS",
                defaults.command_latency,
            ),
            command_timeout: env_duration_secs(
                "ROADCALL_COMMAND_TIMEOUT_SECS",
                defaults.command_timeout,
            ),
            eta_min_minutes: env_parse("ROADCALL_ETA_MIN_MINUTES", defaults.eta_min_minutes),
            eta_max_minutes: env_parse("ROADCALL_ETA_MAX_MINUTES", defaults.eta_max_minutes),
            simulated_provider: std::env::var("ROADCALL_SIMULATED_PROVIDER")
                .unwrap_or(defaults.simulated_provider),
            namespace: std::env::var("ROADCALL_NAMESPACE").unwrap_or(defaults.namespace),
            simulate_dispatch: env_parse("ROADCALL_SIMULATE_DISPATCH", defaults.simulate_dispatch),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_secs)
}

fn env_duration_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}
