//! unveil - Interactive credential disclosure for Daedalos
//!
//! Unlocks a vault profile, lets you pick a record with fzf, and prints it
//! with secrets masked. The first secret is copied to the clipboard.

use age::secrecy::Secret;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use unveil::{
    run_session, ClipboardRelay, Discloser, RecordCatalog, SelectionFilter, Session,
    SessionOptions, UnveilConfig, Vault,
};

#[derive(Parser)]
#[command(name = "unveil")]
#[command(about = "Pick a credential from your vault and disclose it - secrets masked, first one copied")]
#[command(version)]
#[command(after_help = r#"EXAMPLES:
    unveil                  Browse every record
    unveil gmail            Start with a query, auto-pick a single match
    unveil --reveal bank    Print secret values instead of ********
    unveil --no-copy wifi   Leave the clipboard alone

CONFIG:
    ~/.config/daedalos/unveil.yaml sets the vault, profile, filter and
    clipboard commands. Flags override it."#)]
struct Cli {
    /// Path to vault (~ is expanded)
    #[arg(long)]
    vault: Option<String>,

    /// Reveal secret values in output
    #[arg(long)]
    reveal: bool,

    /// Profile name
    #[arg(long)]
    profile: Option<String>,

    /// Don't copy the first secret to the clipboard
    #[arg(long)]
    no_copy: bool,

    /// Config file (default: ~/.config/daedalos/unveil.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial filter query
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,
}

impl Cli {
    fn query(&self) -> Option<String> {
        if self.query.is_empty() {
            None
        } else {
            Some(self.query.join(" "))
        }
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr, stdout carries only the record
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => UnveilConfig::load_from(path)?,
        None => UnveilConfig::load()?,
    };
    if let Some(vault) = &cli.vault {
        config.vault = vault.clone();
    }
    if let Some(profile) = &cli.profile {
        config.profile = profile.clone();
    }

    let vault = Vault::open(&config.vault_path()?).context("Failed to open vault")?;
    let mut profile = vault.profile(&config.profile).with_context(|| {
        let available = vault.profiles().unwrap_or_default();
        format!("Failed to open profile (available: {})", available.join(", "))
    })?;

    let password = rpassword::prompt_password("Password: ")
        .context("Failed to read password")?;
    profile
        .unlock(&Secret::new(password))
        .context("Failed to unlock profile")?;

    let catalog = RecordCatalog::new(profile.items().context("Failed to load items")?);
    debug!(profile = %profile.name, records = catalog.len(), "profile unlocked");

    let filter = SelectionFilter::new(&config.filter);
    let discloser = Discloser::new(ClipboardRelay::from_config(&config.clipboard));
    let mut session = Session::new(SessionOptions {
        reveal: cli.reveal,
        no_copy: cli.no_copy,
    });

    let query = cli.query();
    let mut stdout = std::io::stdout();
    run_session(
        &mut session,
        &catalog,
        &filter,
        &discloser,
        query.as_deref(),
        &mut stdout,
    )
    .await?;

    Ok(())
}
