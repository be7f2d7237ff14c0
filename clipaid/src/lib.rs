pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod input;
pub mod metrics;
pub mod network;
pub mod platform;
pub mod presentation;
pub mod prompts;
pub mod speculative;
pub mod state;
pub mod watcher;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use config::Settings;
use console::{ConsolePresenter, spawn_stdin_reader};
use engine::{Engine, EngineEvent};
use error::AppError;
use metrics::PerformanceReport;
use network::CompletionClient;
use platform::{CLIPBOARD_POLL_INTERVAL, DesktopClipboard, spawn_clipboard_poller};
use state::AppState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SETTINGS_PATH: &str = "clipaid.config.json";
const ENV_SETTINGS_PATH: &str = "CLIPAID_CONFIG";
const ENV_API_KEY: &str = "CLIPAID_API_KEY";

type SetupResult<T> = anyhow::Result<T>;

fn init_logging() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}

fn settings_path() -> PathBuf {
    env::var_os(ENV_SETTINGS_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

fn spawn_ctrl_c_listener(events: mpsc::UnboundedSender<EngineEvent>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, shutting down");
                if events.send(EngineEvent::Shutdown).is_err() {
                    debug!("engine already stopped");
                }
            }
            Err(err) => warn!("failed to listen for ctrl-c: {err}"),
        }
    });
}

async fn run_engine(settings_path: PathBuf) -> SetupResult<PerformanceReport> {
    let settings = Settings::load(&settings_path)?;
    let client = CompletionClient::new()?.with_api_key(env::var(ENV_API_KEY).ok());
    let clipboard = Arc::new(DesktopClipboard::new().context("failed to open system clipboard")?);

    let state = AppState::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let poller = spawn_clipboard_poller(
        Arc::clone(&clipboard),
        events_tx.clone(),
        CLIPBOARD_POLL_INTERVAL,
        shutdown.clone(),
    );
    spawn_stdin_reader(events_tx.clone(), settings_path.clone())
        .context("failed to start stdin reader")?;
    spawn_ctrl_c_listener(events_tx.clone());

    info!(
        endpoint = %settings.endpoint,
        default_action = %settings.default_action,
        settings = %settings_path.display(),
        "clipaid ready; copy text anywhere to rewrite it"
    );

    let engine = Engine::new(
        &state,
        clipboard,
        ConsolePresenter,
        Arc::new(client),
        settings,
        events_tx,
    );
    let report = engine.run(events_rx).await;

    shutdown.cancel();
    if let Err(err) = poller.await {
        warn!("clipboard poller ended abnormally: {err}");
    }

    Ok(report)
}

pub fn run() {
    if let Err(init_err) = init_logging() {
        eprintln!("logging bootstrap failed: {init_err}");
    }

    info!("starting clipaid speculative rewrite engine");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(build_err) => {
            error!("{}", AppError::Runtime(build_err.to_string()));
            return;
        }
    };

    match runtime.block_on(run_engine(settings_path())) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => info!("performance report:\n{json}"),
            Err(err) => warn!("failed to serialize performance report: {err}"),
        },
        Err(run_err) => error!("clipaid stopped: {run_err:#}"),
    }
}
