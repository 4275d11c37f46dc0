//! `equalizer config`: inspect the effective configuration.

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::Global;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as YAML.
    Show,
    /// Print the config file location.
    Path,
}

pub fn run(command: ConfigCommand, global: &Global) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let yaml = global
                .config
                .to_yaml()
                .context("failed to serialize config")?;
            print!("{yaml}");
        }
        ConfigCommand::Path => {
            let marker = if global.config_path.exists() {
                ""
            } else {
                " (not present, using defaults)"
            };
            println!("{}{marker}", global.config_path.display());
        }
    }
    Ok(())
}
