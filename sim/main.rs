#![forbid(unsafe_code)]

//! `batch-conductor-sim`: simulated engine served over stdio.
//!
//! Speaks the engine wire protocol on stdin/stdout so the process backend
//! has a real peer. Logs go to stderr; stdout is reserved for protocol lines.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use batch_conductor::engine::codec::{EngineCodec, DEFAULT_MAX_MESSAGE_BYTES};
use batch_conductor::engine::simulated::SimulatedBackend;
use batch_conductor::engine::wire;

#[derive(Debug, Parser)]
#[command(
    name = "batch-conductor-sim",
    about = "Simulated engine for batch-conductor's process backend",
    version,
    long_about = None
)]
struct Cli {
    /// Units of work each payload line costs.
    #[arg(long, default_value_t = 1)]
    units_per_line: u32,

    /// Delay before the first batch, in milliseconds.
    #[arg(long, default_value_t = 0)]
    warmup_ms: u64,

    /// Cap on one inbound request line, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    max_message_bytes: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    let backend = SimulatedBackend::new(args.units_per_line, Duration::from_millis(args.warmup_ms));
    info!(units_per_line = args.units_per_line, "simulated engine serving on stdio");

    let codec = EngineCodec::with_limit(args.max_message_bytes);
    match wire::serve_with(tokio::io::stdin(), tokio::io::stdout(), codec, &backend).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "engine server failed");
            ExitCode::FAILURE
        }
    }
}
