use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by the rotator binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

/// Common subcommands
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the daemon (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Level derived from the verbosity flags; `RUST_LOG` takes precedence.
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        if args.json_logs {
            builder.json().init();
        } else {
            builder.init();
        }
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            let discovery = &config.defaults.discovery;
            let policy = &config.defaults.policy;
            println!("Rotator Configuration:");
            println!("======================");
            println!("Discovery root: {}", discovery.path.display());
            println!("Include: {:?}", discovery.include);
            println!("Exclude: {:?}", discovery.exclude);
            println!("Max depth: {}", discovery.max_depth);
            println!("Size threshold: {}", policy.size);
            println!("Age threshold: {:?}", policy.age);
            println!("Inactivity threshold: {:?}", policy.inactive);
            println!("Keep files: {}", policy.keep_files);
            println!("Keep days: {}", policy.keep_days);
            println!("Compress after: {:?}", policy.compress_after);
            println!("Technique: {}", policy.rotation_technique());
            println!(
                "Namespace budget: {}",
                config.defaults.budgets.per_namespace_bytes
            );
            println!("Namespace overrides: {}", config.overrides.namespaces.len());
            println!("Path overrides: {}", config.overrides.paths.len());
            println!("Scan interval: {:?}", config.daemon.scan_interval);
            println!("Listen: {}", config.daemon.listen);
            println!("Journal: {}", config.daemon.journal_path.display());
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        tracing::info!("Validating configuration...");
        config.validate().context("Configuration validation failed")?;
        tracing::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting the daemon
    pub async fn handle_common_command(
        command: &CommonCommands,
        config: &Configuration,
    ) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
