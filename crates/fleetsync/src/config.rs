//! Resolve the effective `SyncConfig` from the config file, the active
//! profile, and command-line overrides.

use secrecy::SecretString;
use url::Url;

use fleetsync_config::{Config, Profile, profile_to_sync_config};
use fleetsync_core::config::DEFAULT_CHANNEL_URL;
use fleetsync_core::{SyncConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Profile name in effect: `--profile`, then the file's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `SyncConfig` for commands that talk to the fleet server.
pub fn build_sync_config(global: &GlobalOpts) -> Result<SyncConfig, CliError> {
    let cfg = fleetsync_config::load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut sync = if let Some(profile) = cfg.profiles.get(&profile_name) {
        profile_to_sync_config(profile, &profile_name, &cfg.defaults)?
    } else if global.profile.is_some() {
        let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if names.is_empty() {
                "(none)".into()
            } else {
                names.join(", ")
            },
        });
    } else {
        // No profile on disk: flags and environment only.
        let bare = Profile {
            url: global
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_CHANNEL_URL.into()),
            ..Profile::default()
        };
        profile_to_sync_config(&bare, &profile_name, &cfg.defaults)?
    };

    apply_overrides(&mut sync, global)?;
    Ok(sync)
}

fn apply_overrides(sync: &mut SyncConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref raw) = global.url {
        let url = parse_url("url", raw)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(CliError::Validation {
                field: "url".into(),
                reason: format!("expected a ws:// or wss:// URL, got {raw}"),
            });
        }
        sync.url = url;
    }
    if let Some(ref raw) = global.rest_url {
        sync.rest_url = Some(parse_url("rest-url", raw)?);
    }
    if let Some(ref token) = global.token {
        sync.auth_token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        sync.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        sync.command_timeout = timeout;
    }
    Ok(())
}

fn parse_url(field: &str, raw: &str) -> Result<Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}
