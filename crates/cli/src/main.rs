//! JWKS trust CLI.
//!
//! This tool provides commands for:
//! - Running an in-process issue, publish and verify scenario
//! - Verifying a token against a remote discovery document
//! - Listing the usable keys of a remote discovery document
//! - Validating configuration files

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod demo;
mod error;
mod logging;
mod trust;

use error::CliError;

#[derive(Parser)]
#[command(name = "jwkscli")]
#[command(about = "Issue, publish and verify Ed25519 tokens")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a key, issue a token and verify it in-process
    Demo {
        /// Key identifier to register
        #[arg(long, default_value = "key-001")]
        kid: String,

        /// Value of the iss claim
        #[arg(long, default_value = "demo")]
        issuer: String,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },

    /// Verify a token against a remote discovery document
    Verify {
        /// Compact token to verify
        #[arg(long)]
        token: String,

        /// Discovery document URL, overriding the configured one
        #[arg(long)]
        jwks_url: Option<String>,

        /// Path to the TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Discovery document commands
    Jwks {
        #[command(subcommand)]
        action: JwksAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum JwksAction {
    /// Fetch a discovery document and list the usable kids
    Fetch {
        /// Discovery document URL, overriding the configured one
        #[arg(long)]
        jwks_url: Option<String>,

        /// Path to the TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config against settings validation
    Validate {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logger(cli.verbose) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Demo { kid, issuer, ttl } => demo::run(kid, issuer, ttl).await,
        Commands::Verify {
            token,
            jwks_url,
            config,
        } => trust::verify(token, jwks_url, config).await,
        Commands::Jwks { action } => match action {
            JwksAction::Fetch { jwks_url, config } => trust::fetch(jwks_url, config).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(file, cli.verbose),
        },
    }
}
