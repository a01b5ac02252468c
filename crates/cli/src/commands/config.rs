use anyhow::{bail, Context, Result};
use clap::Subcommand;
use conduit_core::{config::AppConfig, types::Priority};
use std::path::Path;

use super::utils::{print_error, print_info, print_success};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Validate,

    /// Show the effective configuration after defaults and environment overrides
    Show,
}

pub fn handle_config_command(command: ConfigCommands, file: &str) -> Result<()> {
    match command {
        ConfigCommands::Validate => validate_config(file),
        ConfigCommands::Show => show_config(file),
    }
}

fn validate_config(file: &str) -> Result<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        bail!("file not found: {file}");
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = AppConfig::from_file(file).context("failed to parse configuration")?;

    print_info("Validating configuration...");
    if let Err(e) = config.validate() {
        print_error(&e);
        bail!("invalid configuration: {e}");
    }

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    for network in &config.networks {
        println!(
            "  Network {} ({}): {} providers",
            network.chain_id,
            network.name,
            network.providers.len()
        );
    }
    println!(
        "  Batching: max {} calls, {}ms wait, context grouping {}",
        config.batching.max_batch_size,
        config.batching.max_wait_ms,
        if config.batching.group_by_context { "on" } else { "off" }
    );
    println!(
        "  Cache: {} entries, TTL high/medium/low {}/{}/{}ms",
        config.cache.max_entries,
        config.cache.ttl_for(Priority::High, None).as_millis(),
        config.cache.ttl_for(Priority::Medium, None).as_millis(),
        config.cache.ttl_for(Priority::Low, None).as_millis()
    );
    println!(
        "  Health checks: every {}s, unhealthy after {} errors",
        config.health_check.interval_seconds, config.health_check.unhealthy_threshold
    );

    Ok(())
}

fn show_config(file: &str) -> Result<()> {
    let config = AppConfig::from_file(file).context("failed to parse configuration")?;
    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;

    println!("# Effective configuration from {file}");
    println!("{rendered}");
    Ok(())
}
