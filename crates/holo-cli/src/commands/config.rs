//! Config command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};

use holo_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Get { key } => {
            let config = super::load_config();
            match get_config_value(&config, &key) {
                Some(v) => println!("{}: {}", key, v),
                None => bail!("Unknown configuration key: {}", key),
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = super::load_config();
            if !set_config_value(&mut config, &key, &value)? {
                bail!("Unknown configuration key: {}", key);
            }
            config.validate()?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }

        ConfigAction::Show => {
            let config = super::load_config();
            println!();
            println!("Holo Configuration");
            println!("{}", "─".repeat(50));
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
            if std::env::var_os(holo_core::RELAY_URL_ENV).is_some() {
                println!();
                println!(
                    "  {} is set; relay in use: {}",
                    holo_core::RELAY_URL_ENV,
                    config.relay_url()
                );
            }
            println!();
        }

        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }

        ConfigAction::Reset => {
            Config::default().save()?;
            println!("Configuration reset to defaults.");
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "relay.url" => Some(config.relay.url.clone()),
        "transfer.chunk_size" => Some(config.transfer.chunk_size.to_string()),
        "receive.output_dir" => Some(
            config
                .receive
                .output_dir
                .as_ref()
                .map_or_else(String::new, |p| p.display().to_string()),
        ),
        "receive.overwrite" => Some(config.receive.overwrite.to_string()),
        _ => None,
    }
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<bool> {
    match key {
        "relay.url" => {
            config.relay.url = value.to_string();
            Ok(true)
        }
        "transfer.chunk_size" => {
            config.transfer.chunk_size = value.parse()?;
            Ok(true)
        }
        "receive.output_dir" => {
            config.receive.output_dir = if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
            Ok(true)
        }
        "receive.overwrite" => {
            config.receive.overwrite = value.parse()?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
