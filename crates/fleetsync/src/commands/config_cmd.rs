//! Config subcommand handlers.

use std::io::BufRead;

use fleetsync_config::{self as config, Config, KEYRING_SERVICE, Profile};

use crate::cli::{AddProfileArgs, ConfigArgs, ConfigCommand, GlobalOpts, SetTokenArgs};
use crate::config::active_profile_name;
use crate::error::CliError;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            for profile in cfg.profiles.values_mut() {
                if profile.token.is_some() {
                    profile.token = Some(REDACTED.into());
                }
            }
            print!("{}", toml::to_string_pretty(&cfg).map_err(config::ConfigError::from)?);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = active_profile_name(global, &cfg);
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort_unstable();
            for name in names {
                let marker = if *name == active { "*" } else { " " };
                println!("{marker} {name}  {}", cfg.profiles[name].url);
            }
            Ok(())
        }

        ConfigCommand::Add(args) => add_profile(args),

        ConfigCommand::SetToken(args) => {
            let cfg = config::load_config_or_default();
            set_token(&active_profile_name(global, &cfg), args)
        }
    }
}

fn add_profile(args: AddProfileArgs) -> Result<(), CliError> {
    let mut cfg: Config = config::load_config()?;
    let profile = Profile {
        url: args.channel_url,
        rest_url: args.fallback_url,
        token_env: args.token_env,
        ..Profile::default()
    };

    // Validate before writing anything.
    config::profile_to_sync_config(&profile, &args.name, &cfg.defaults)?;

    if args.default || cfg.profiles.is_empty() {
        cfg.default_profile = Some(args.name.clone());
    }
    cfg.profiles.insert(args.name.clone(), profile);
    config::save_config(&cfg)?;
    eprintln!("Saved profile '{}' to {}", args.name, config::config_path().display());
    Ok(())
}

fn set_token(profile_name: &str, args: SetTokenArgs) -> Result<(), CliError> {
    let token = match args.token {
        Some(token) => token,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim().to_owned()
        }
    };
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }

    let keyring_err = |e: keyring::Error| CliError::Keyring {
        reason: e.to_string(),
    };
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .map_err(keyring_err)?
        .set_password(&token)
        .map_err(keyring_err)?;
    eprintln!("Token for profile '{profile_name}' stored in the system keyring");
    Ok(())
}
