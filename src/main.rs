/*!
 * CloudFS - Main Entry Point
 *
 * Loads the configuration, links every account, then runs the managers
 * until all of them have stopped.
 */

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

use cloudfs::{init_tracing, BuildContext, Configurator, Registry, SettingsStore};

const CONFIG_CANDIDATES: &[&str] = &["config.dev.toml", "config.toml"];

#[derive(Parser, Debug)]
#[command(name = "cloudfs", version, about = "Serve file-hosting accounts over shell and FTP")]
struct Cli {
    /// Configuration file; defaults to config.dev.toml, then config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings store holding tokens and other per-account values
    #[arg(short, long, default_value = "settings.json")]
    settings: PathBuf,

    /// Directory that relative account data paths resolve against
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    match CONFIG_CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists()) {
        Some(path) => Ok(path),
        None => bail!("no configuration file found (tried {})", CONFIG_CANDIDATES.join(", ")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    info!("CloudFS starting...");

    let settings = SettingsStore::open(&cli.settings)
        .with_context(|| format!("opening settings store {}", cli.settings.display()))?;
    let context = BuildContext::new(Arc::new(settings), &cli.data_dir);
    let registry = Registry::with_defaults();

    let path = config_path(&cli)?;
    let configuration = Configurator::from_path(&path, &registry, &context)
        .with_context(|| format!("loading configuration {}", path.display()))?;

    for account in configuration.accounts() {
        account
            .authenticate()
            .with_context(|| format!("authenticating account {}", account.unique_id()))?;
        info!(account = %account.unique_id(), "account ready");
    }

    let mut started = 0;
    for manager in configuration.managers() {
        match manager.run() {
            Ok(()) => started += 1,
            Err(e) => error!(manager = %manager.unique_id(), error = %e, "manager failed to start"),
        }
    }
    if started == 0 {
        bail!("no manager could be started");
    }
    info!(managers = started, "CloudFS running");

    while configuration.managers().iter().any(|m| m.is_running()) {
        thread::sleep(Duration::from_millis(200));
    }
    for manager in configuration.managers() {
        manager.stop();
    }
    info!("CloudFS stopped");
    Ok(())
}
