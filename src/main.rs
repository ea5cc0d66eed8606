//! servctl binary entry point: config + CLI layering, store bootstrap,
//! server wiring, cooperative shutdown.

use anyhow::Result;
use clap::Parser;
use servctl::accounts::Accounts;
use servctl::api::{ApiServer, ServerContext};
use servctl::config::Config;
use servctl::console::{self, ConsoleSessions, ConsoleState};
use servctl::files::UserFiles;
use servctl::runner::ShellRunner;
use servctl::scripts::ScriptStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "servctl", version, about = "Remote administration server")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the command-protocol port (0 = OS-assigned).
    #[arg(long, value_name = "PORT")]
    api_port: Option<u16>,

    /// Override the web console port.
    #[arg(long, value_name = "PORT")]
    console_port: Option<u16>,

    /// Override the account-store directory.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.api_port {
        config.api.port = port;
    }
    if let Some(port) = cli.console_port {
        config.console.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    let accounts = Arc::new(Accounts::open(&config.storage.data_dir)?);
    let ctx = Arc::new(ServerContext {
        accounts: Arc::clone(&accounts),
        runner: Arc::new(ShellRunner),
        scripts: ScriptStore::new(&config.storage.scripts_dir),
        files: UserFiles::new(&config.storage.user_files_dir),
    });

    // One shutdown signal shared by every subsystem: the console's
    // shutdown activity, Ctrl-C, and a console startup failure all
    // terminate the process cooperatively.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api = ApiServer::bind(&config.api.host, config.api.port, ctx).await?;
    let api_stats = api.stats();
    let api_task = tokio::spawn(api.run(shutdown_rx.clone()));

    let console_state = ConsoleState {
        accounts,
        sessions: Arc::new(ConsoleSessions::new()),
        api_stats,
        shutdown: shutdown_tx.clone(),
        server_name: config.server_name.clone(),
    };
    let console_host = config.console.host.clone();
    let console_port = config.console.port;
    let console_shutdown = shutdown_tx.clone();
    let console_task = tokio::spawn(async move {
        if let Err(e) = console::run(&console_host, console_port, console_state).await {
            tracing::error!("Web console error: {e}");
            let _ = console_shutdown.send(true);
        }
    });

    let mut shutdown_watch = shutdown_rx;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
        }
        _ = shutdown_watch.changed() => {}
    }
    let _ = shutdown_tx.send(true);

    let _ = api_task.await;
    let _ = console_task.await;
    tracing::info!("Server has been stopped");
    Ok(())
}
