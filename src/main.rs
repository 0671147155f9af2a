#![forbid(unsafe_code)]

//! `batch-conductor`: bounded-batch engine orchestrator binary.
//!
//! Loads configuration, runs one session against the configured engine
//! backend, prints the session report, and exits with a code reflecting the
//! outcome: 0 when the session finished, 1 when it aborted before acquiring
//! an engine, 130 when an interrupt stopped it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use batch_conductor::config::{EngineKind, GlobalConfig};
use batch_conductor::orchestrator::Orchestrator;
use batch_conductor::report;
use batch_conductor::{AppError, Result};

/// Exit code for configuration or runtime bootstrap failures.
const EXIT_ABORTED: u8 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum EngineArg {
    Simulated,
    Process,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Simulated => Self::Simulated,
            EngineArg::Process => Self::Process,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "batch-conductor",
    about = "Run a stateful engine in bounded batches",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine input payload.
    #[arg(long)]
    payload: Option<PathBuf>,

    /// State file read at start and written at end.
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Units of work per batch.
    #[arg(long)]
    batch_size: Option<u32>,

    /// Maximum batches in this session.
    #[arg(long)]
    max_batches: Option<u32>,

    /// Per-batch timeout in seconds (0 disables).
    #[arg(long)]
    batch_timeout: Option<u64>,

    /// Discard persisted state before starting.
    #[arg(long)]
    fresh: bool,

    /// Engine backend.
    #[arg(long, value_enum)]
    engine: Option<EngineArg>,

    /// Engine executable for the process backend.
    #[arg(long)]
    engine_command: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Report output format (text or json).
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::from(EXIT_ABORTED);
    }
    info!("batch-conductor bootstrap");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::from(EXIT_ABORTED);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(%err, "session could not start");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

async fn run(args: Cli) -> Result<u8> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;
    info!("configuration loaded");

    let orchestrator = Orchestrator::from_global(&config);

    // ── Interrupt handling ──────────────────────────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    let signal_handle = tokio::spawn(async move {
        tokio::select! {
            () = shutdown_signal() => {
                info!("interrupt received");
                signal_ct.cancel();
            }
            () = signal_ct.cancelled() => {}
        }
    });

    let session = orchestrator.run(&ct).await;
    ct.cancel();
    let _ = signal_handle.await;

    // ── Report ──────────────────────────────────────────
    let rendered = match args.report {
        ReportFormat::Text => report::render_text(&session),
        ReportFormat::Json => report::render_json(&session)?,
    };
    println!("{rendered}");

    Ok(session.exit_code())
}

fn apply_overrides(config: &mut GlobalConfig, args: &Cli) {
    if let Some(payload) = &args.payload {
        config.payload_path.clone_from(payload);
    }
    if let Some(state_path) = &args.state_path {
        config.state_path.clone_from(state_path);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_batches) = args.max_batches {
        config.max_batches = max_batches;
    }
    if let Some(timeout) = args.batch_timeout {
        config.batch_timeout_seconds = timeout;
    }
    if args.fresh {
        config.fresh = true;
    }
    if let Some(engine) = args.engine {
        config.engine.kind = engine.into();
    }
    if let Some(command) = &args.engine_command {
        config.engine.command.clone_from(command);
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the report; logs go to stderr.
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
