// ABOUTME: Entry point for the coven-hostauth command-line tool.
// ABOUTME: Generates challenges, verifies them from stdin, and lists trusted keys.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coven_hostauth::{fingerprint, Challenge, ChallengeProtocol, HostAuthConfig};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coven-hostauth")]
#[command(about = "Authenticate hosts to each other with their SSH keys")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults to ~/.config/coven/hostauth.toml)
    #[arg(long, global = true, env = "COVEN_HOSTAUTH_CONFIG")]
    config: Option<PathBuf>,

    /// SSH directory holding id_* keys and authorized_keys (defaults to ~/.ssh)
    #[arg(long, global = true, env = "COVEN_SSH_DIR")]
    ssh_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign the current time and print the challenge as JSON
    Challenge,

    /// Validate a challenge read as JSON from a file or stdin
    Verify {
        /// File containing the challenge (defaults to stdin)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// List the public keys this machine trusts
    TrustedKeys,
}

/// Logging to stderr so stdout stays clean for JSON. Default: INFO level, RUST_LOG override.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    let mut config =
        HostAuthConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(ssh_dir) = cli.ssh_dir {
        config = config.with_ssh_dir(ssh_dir);
    }
    let protocol = ChallengeProtocol::from_config(&config);

    match cli.command {
        Commands::Challenge => {
            let challenge = protocol
                .generate_challenge()
                .context("Failed to generate challenge")?;
            println!("{}", challenge.to_json()?);
        }
        Commands::Verify { file } => {
            let payload = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read challenge from {}", path.display()))?,
                None => {
                    let mut payload = String::new();
                    std::io::stdin()
                        .read_to_string(&mut payload)
                        .context("Failed to read challenge from stdin")?;
                    payload
                }
            };
            let challenge = Challenge::from_json(&payload).context("Failed to decode challenge")?;
            protocol
                .validate_challenge(&challenge)
                .context("Challenge rejected")?;
            println!("ok");
        }
        Commands::TrustedKeys => {
            let keys = protocol
                .keys()
                .load_all_public_keys()
                .context("Failed to load public keys")?;
            for key in keys.iter().filter(|k| !k.as_str().is_empty()) {
                let fp = fingerprint(key).unwrap_or_else(|| "-".to_string());
                println!("{}  {}", fp, key);
            }
        }
    }

    Ok(())
}
