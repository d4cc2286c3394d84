//! `config` commands.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::cli::{ConfigAction, ConfigCommand};
use crate::config::Config;

pub fn execute(cmd: ConfigCommand, path: Option<&Path>, config: &Config) -> Result<()> {
    match cmd.action {
        ConfigAction::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let config_path = Config::config_path(path);
            if config_path.exists() {
                println!("{}", config_path.display());
            } else {
                println!(
                    "{} {}",
                    config_path.display(),
                    "(not found, using defaults)".yellow()
                );
            }
        }
    }
    Ok(())
}
