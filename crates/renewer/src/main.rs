//! ACME Renewer - Main entry point
//!
//! Handles exactly one renewal request per invocation and prints the outcome.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use renewer::{RenewalError, Renewer};
use renewer_config::validate::lint_config;
use renewer_config::{RenewalRequest, RenewerConfig};

/// ACME Renewer - issue and renew TLS certificates through ACME
#[derive(Parser, Debug)]
#[command(name = "acme-renewer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(
        short = 'c',
        long = "config",
        env = "ACME_RENEWER_CONFIG",
        default_value = "renewer.toml"
    )]
    config: PathBuf,

    /// ACME directory URL, overrides the configuration file
    #[arg(long = "directory-url", env = "ACME_DIRECTORY_URL")]
    directory_url: Option<String>,

    /// ACME account contact email, overrides the configuration file
    #[arg(long = "contact", env = "ACME_CONTACT")]
    contact: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long = "json-logs")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file and exit
    Test,
    /// Handle one renewal request (default)
    Renew {
        /// Renewal request JSON file; read from stdin when omitted
        #[arg(short = 'r', long = "request")]
        request: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let mut config = RenewerConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration file {}", cli.config.display()))?;
    config
        .apply_overrides(cli.directory_url, cli.contact)
        .context("Configuration validation failed")?;

    match cli.command {
        Some(Commands::Test) => test_config(&cli.config, &config),
        _ if cli.test => test_config(&cli.config, &config),
        Some(Commands::Renew { request }) => renew(&config, request.as_deref()),
        None => renew(&config, None),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Lint the loaded configuration and exit
fn test_config(path: &Path, config: &RenewerConfig) -> Result<ExitCode> {
    let result = lint_config(config);
    for warning in &result.warnings {
        warn!("{}", warning);
    }

    info!("Configuration test successful:");
    info!("  - ACME directory: {}", config.acme.directory_url);
    info!("  - DNS zone API: {}", config.dns.is_some());
    info!("  - WAF policy API: {}", config.waf.is_some());

    println!(
        "acme-renewer: configuration file {} test is successful",
        path.display()
    );
    Ok(ExitCode::SUCCESS)
}

/// Run one renewal request to completion
fn renew(config: &RenewerConfig, request_path: Option<&Path>) -> Result<ExitCode> {
    let request = match request_path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open renewal request {}", path.display()))?;
            RenewalRequest::from_reader(file)
        }
        None => RenewalRequest::from_reader(io::stdin().lock()),
    }
    .context("Failed to parse renewal request")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let outcome = runtime.block_on(async {
        let renewer = Renewer::from_config(config).await?;
        renewer.renew(&request).await
    });

    match outcome {
        Ok(outcome) => {
            println!("{}", outcome);
            Ok(ExitCode::SUCCESS)
        }
        Err(RenewalError::Configuration(message)) => {
            println!("Error: {}", message);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!(domain = %request.cn_name, error = %e, "Renewal failed");
            Err(e).context("Renewal failed")
        }
    }
}
