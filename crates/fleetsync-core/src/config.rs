// ── Runtime synchronization configuration ──
//
// These types describe *how* to reach the remote system and how the client
// behaves under failure. They never touch disk: `fleetsync-config` (or any
// consumer) builds a `SyncConfig` and hands it in.

use std::sync::LazyLock;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

pub const DEFAULT_CHANNEL_URL: &str = "ws://localhost:8765/";
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 500;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EMERGENCY_STOP_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static DEFAULT_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse(DEFAULT_CHANNEL_URL)
        .unwrap_or_else(|e| unreachable!("{DEFAULT_CHANNEL_URL} is a literal URL: {e}"))
});

/// TLS verification strategy for the REST fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab remotes).
    DangerAcceptInvalid,
}

/// Exponential backoff for reconnection.
///
/// The delay before reconnection attempt `n` (zero-based) is
/// `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub base_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Reconnection attempts after a failure before giving up. Default: 10.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Configuration for one synchronization client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Persistent channel URL (e.g. `ws://10.0.0.5:8765/ws`).
    pub url: Url,
    /// REST base URL for degraded mode; `None` disables the fallback.
    pub rest_url: Option<Url>,
    /// Bearer token sent on the WebSocket upgrade and REST requests.
    pub auth_token: Option<SecretString>,
    /// TLS verification for the REST fallback.
    pub tls: TlsVerification,
    pub reconnect: ReconnectPolicy,
    /// Upper bound on a single handshake.
    pub connect_timeout: Duration,
    /// Interval for `ping` frames while open; `None` sends none.
    pub keepalive_interval: Option<Duration>,
    /// Points kept per entity in the telemetry store.
    pub telemetry_capacity: usize,
    /// Outbound queue bound; `None` is unbounded. When full, the oldest
    /// queued message is dropped.
    pub queue_capacity: Option<usize>,
    /// Default wait for a command response.
    pub command_timeout: Duration,
    /// Wait for an emergency-stop acknowledgement.
    pub emergency_stop_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.clone(),
            rest_url: None,
            auth_token: None,
            tls: TlsVerification::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: None,
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
            queue_capacity: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            emergency_stop_timeout: DEFAULT_EMERGENCY_STOP_TIMEOUT,
        }
    }
}

impl SyncConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }
}
