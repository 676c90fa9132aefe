use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use clap::Parser;
use color_eyre::Result;
use garden_runtime::{parse_command_line, GardenService, SyncLoop};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod http;
mod ui;

use app::DashboardApp;
use config::{load_dashboard_config, DashboardConfig};
use http::HttpGardenService;

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal dashboard for the garden simulation", long_about = None)]
struct Cli {
    /// Dashboard config file (JSON). Defaults to $GARDEN_DASHBOARD_CONFIG, then builtin settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL of the simulation REST API, e.g. http://localhost:8080/api.
    #[arg(long)]
    base_url: Option<String>,
    /// Milliseconds between status polls.
    #[arg(long)]
    status_interval_ms: Option<u64>,
    /// Milliseconds between parcel polls.
    #[arg(long)]
    parcel_interval_ms: Option<u64>,
    /// Run a single command (start, pause, reset, step, "speed 2.5") and exit.
    #[arg(long, value_name = "COMMAND")]
    exec: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut DashboardConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(ms) = self.status_interval_ms {
            config.sync.status_interval_ms = ms;
        }
        if let Some(ms) = self.parcel_interval_ms {
            config.sync.parcel_interval_ms = ms;
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_pane_logging() -> Receiver<String> {
    let (log_tx, log_rx) = mpsc::channel::<String>();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .compact()
        .with_ansi(false)
        .with_writer(move || ChannelWriter {
            sender: log_tx.clone(),
        })
        .init();
    log_rx
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let log_rx = match cli.exec {
        Some(_) => {
            init_stderr_logging();
            None
        }
        None => Some(init_pane_logging()),
    };

    let (mut config, config_path) = load_dashboard_config(cli.config.as_deref());
    cli.apply(&mut config);
    let service = HttpGardenService::new(&config.base_url, config.request_timeout())?;
    info!(
        base_url = service.base_url(),
        config = ?config_path,
        "dashboard.starting"
    );

    let Some(log_rx) = log_rx else {
        let line = cli.exec.as_deref().unwrap_or_default();
        return run_once(&service, line).await;
    };

    let sync = SyncLoop::start(service, config.sync_config())?;
    let runtime = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let _guard = runtime.enter();
        let app = DashboardApp::new(sync, log_rx, &config)?;
        app.run()
    })
    .await??;

    info!("dashboard.closed");
    Ok(())
}

/// Fetch status, check the command against it, send it, then print the
/// refreshed status.
async fn run_once<S: GardenService>(service: &S, line: &str) -> Result<()> {
    let command = parse_command_line(line)?;

    let status = match service.fetch_status().await {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(error = %err, "sync.fetch_failed");
            None
        }
    };
    command.check(status.as_ref())?;

    let outcome = service.execute(command).await;
    let refreshed = service.fetch_status().await;
    outcome?;
    info!(command = %command, "command.completed");

    let state = refreshed?;
    println!(
        "{command}: step {} | {} | speed {:.1}x",
        state.current_step,
        state.status_label(),
        state.speed_multiplier
    );
    Ok(())
}
