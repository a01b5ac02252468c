use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conduit_core::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{handle_call_command, handle_config_command, handle_health_command, CallArgs, ConfigCommands};

const DEFAULT_FILTER: &str = "warn,conduit_core=info,conduit_cli=info";

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Conduit CLI - inspect and exercise the RPC orchestration layer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "CONDUIT_CONFIG", default_value = "config/config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Probe every configured provider once and print its health
    Health {
        /// Print the health snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute one read through the full cache, dedup, and batch pipeline
    Call(CallArgs),
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config(config_command) => handle_config_command(config_command, &cli.config)?,

        Commands::Health { json } => {
            let config = AppConfig::from_file(&cli.config)
                .with_context(|| format!("failed to load configuration from {}", cli.config))?;
            init_logging(&config);
            tracing::debug!(config_file = %cli.config, "configuration loaded");
            handle_health_command(config, json).await?;
        }

        Commands::Call(args) => {
            let config = AppConfig::from_file(&cli.config)
                .with_context(|| format!("failed to load configuration from {}", cli.config))?;
            init_logging(&config);
            tracing::debug!(config_file = %cli.config, chain_id = args.chain_id, "configuration loaded");
            handle_call_command(config, args).await?;
        }
    }

    Ok(())
}
