mod config;
mod error;
mod state;

use std::process::ExitCode;

use clap::Parser;
use kl_infra::{Driver, LxcHypervisor};
use lxc_api::LxcClient;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Cli, Command};
use crate::error::CliError;
use crate::state::StateStore;

/// Exit status for configuration problems, distinct from provisioning failures.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries command results.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "kitchen-lxd failed");
            if e.is_config() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::from_args(cli.command.instance_args())?;
    let name = config.instance.name.clone();

    let client = LxcClient::new().binaries(&cli.lxc_bin, &cli.import_bin);
    let driver = Driver::new(LxcHypervisor::new(client), config.options).with_retry(config.retry);
    let store = StateStore::new(&cli.state_dir);
    let mut run_state = store.load(&name)?;

    match cli.command {
        Command::Create(_) => {
            tracing::info!(container = %name, platform = %config.instance.platform_name, "creating");
            let result = interruptible(driver.create(&config.instance, &mut run_state)).await;
            // Whatever was learned before a failure is kept for the next run.
            store.save(&name, &run_state)?;
            result?;
            if let Some(hostname) = &run_state.hostname {
                println!("{hostname}");
            }
        }
        Command::Destroy(_) => {
            tracing::info!(container = %name, "destroying");
            let result = interruptible(driver.destroy(&config.instance, &mut run_state)).await;
            store.save(&name, &run_state)?;
            result?;
        }
        Command::Status(_) => {
            let observed = driver.state(&config.instance).await?;
            match &run_state.hostname {
                Some(hostname) => println!("{observed} {hostname}"),
                None => println!("{observed}"),
            }
        }
    }

    Ok(())
}

/// Run `fut` until it finishes or Ctrl-C arrives, whichever is first.
///
/// Dropping the future abandons any in-flight command; its child process is
/// killed on drop.
async fn interruptible<F>(fut: F) -> Result<(), CliError>
where
    F: Future<Output = kl_infra::Result<()>>,
{
    race_interrupt(fut, tokio::signal::ctrl_c()).await
}

/// Run `fut` unless `interrupt` fires first.
///
/// An `interrupt` that fails leaves `fut` running to completion.
async fn race_interrupt<F, S>(fut: F, interrupt: S) -> Result<(), CliError>
where
    F: Future<Output = kl_infra::Result<()>>,
    S: Future<Output = std::io::Result<()>>,
{
    let interrupted = async {
        if let Err(e) = interrupt.await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C, running to completion");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = fut => result.map_err(CliError::from),
        () = interrupted => {
            tracing::warn!("interrupted, abandoning operation");
            Err(CliError::Interrupted)
        }
    }
}
