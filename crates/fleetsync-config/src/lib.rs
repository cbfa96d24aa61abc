//! Shared configuration for fleetsync tools.
//!
//! TOML profiles, environment overrides, token resolution (env + keyring +
//! plaintext), and translation to `fleetsync_core::SyncConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use fleetsync_core::{ReconnectPolicy, SyncConfig, TlsVerification};

/// Keyring service name for stored tokens.
pub const KEYRING_SERVICE: &str = "fleetsync";

/// Prefix for environment overrides, e.g.
/// `FLEETSYNC_DEFAULTS__COMMAND_TIMEOUT_MS=5000`.
pub const ENV_PREFIX: &str = "FLEETSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Values every profile inherits unless it overrides them.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named remote profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
    pub connect_timeout_secs: u64,
    pub command_timeout_ms: u64,
    pub emergency_stop_timeout_ms: u64,
    pub telemetry_capacity: usize,
    /// Outbound queue bound; absent means unbounded.
    pub queue_capacity: Option<usize>,
    /// Keep-alive ping period; absent disables pings.
    pub keepalive_secs: Option<u64>,
    pub insecure: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            reconnect_base_delay_ms: millis(sync.reconnect.base_delay),
            reconnect_max_delay_ms: millis(sync.reconnect.max_delay),
            reconnect_max_attempts: sync.reconnect.max_attempts,
            connect_timeout_secs: sync.connect_timeout.as_secs(),
            command_timeout_ms: millis(sync.command_timeout),
            emergency_stop_timeout_ms: millis(sync.emergency_stop_timeout),
            telemetry_capacity: sync.telemetry_capacity,
            queue_capacity: sync.queue_capacity,
            keepalive_secs: None,
            insecure: false,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A named remote profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Persistent channel URL (e.g., "ws://10.0.0.5:8765/").
    pub url: String,

    /// REST base URL for degraded mode (e.g., "http://10.0.0.5:8085").
    pub rest_url: Option<String>,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate for the REST fallback.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    pub reconnect_max_attempts: Option<u32>,
    pub command_timeout_ms: Option<u64>,
    pub telemetry_capacity: Option<usize>,
    pub keepalive_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "fleetsync", "fleetsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `FLEETSYNC_` variables.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    Ok(figment(path).extract()?)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: profile's `token_env` variable, then the
/// system keyring, then plaintext. A profile without a token is valid.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `SyncConfig` from a profile layered over `defaults`.
pub fn profile_to_sync_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let url = parse_url("url", &profile.url)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("expected a ws:// or wss:// URL, got {}", profile.url),
        });
    }
    let rest_url = profile
        .rest_url
        .as_deref()
        .map(|raw| parse_url("rest_url", raw))
        .transpose()?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let telemetry_capacity = profile
        .telemetry_capacity
        .unwrap_or(defaults.telemetry_capacity);
    if telemetry_capacity == 0 {
        return Err(ConfigError::Validation {
            field: "telemetry_capacity".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(SyncConfig {
        url,
        rest_url,
        auth_token: resolve_token(profile, profile_name),
        tls,
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(defaults.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(defaults.reconnect_max_delay_ms),
            max_attempts: profile
                .reconnect_max_attempts
                .unwrap_or(defaults.reconnect_max_attempts),
        },
        connect_timeout: Duration::from_secs(defaults.connect_timeout_secs),
        keepalive_interval: profile
            .keepalive_secs
            .or(defaults.keepalive_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        telemetry_capacity,
        queue_capacity: defaults.queue_capacity,
        command_timeout: Duration::from_millis(
            profile.command_timeout_ms.unwrap_or(defaults.command_timeout_ms),
        ),
        emergency_stop_timeout: Duration::from_millis(defaults.emergency_stop_timeout_ms),
    })
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

// ── Tests ───────────────────────────────────────────────────────────
