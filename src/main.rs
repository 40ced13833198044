//! loghub node
//!
//! Joins the machine's log hub (electing one if none is running) and
//! forwards every stdin line to it as an event.
//!
//! ```text
//! stdin ──lines──► Node::emit ──► forwarder ──ws──► hub ──► viewers
//! ```
//!
//! A client exits at end of input; a hub keeps serving until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use loghub::config::load_config;
use loghub::failover::Phase;
use loghub::lifecycle::shutdown_signal;
use loghub::observability::logging::init_logging;
use loghub::{Level, LogEvent};

#[derive(Parser)]
#[command(name = "loghub")]
#[command(about = "Join or become the shared log hub and forward stdin lines to it", long_about = None)]
struct Args {
    /// Service name attached to forwarded events
    #[arg(short, long, default_value = "stdin")]
    service: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Level for lines that are not JSON events
    #[arg(short, long, default_value = "INFO")]
    level: Level,
}

/// JSON lines that decode as events pass through; anything else is a message.
fn line_to_event(line: &str, service: &str, level: Level) -> LogEvent {
    if line.trim_start().starts_with('{') {
        if let Ok(mut event) = serde_json::from_str::<LogEvent>(line) {
            if event.service.trim().is_empty() {
                event.service = service.to_string();
            }
            return event;
        }
    }
    LogEvent::new(level, service, line)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("loghub: {e}");
            return ExitCode::from(2);
        }
    };
    init_logging(&config.observability);

    let node = match loghub::start(config, &args.service).await {
        Ok(Some(node)) => node,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    let signal = shutdown_signal();
    tokio::pin!(signal);
    let mut states = node.subscribe();
    let stopped = async move {
        let _ = states.wait_for(|s| s.phase() == Phase::Stopped).await;
    };
    tokio::pin!(stopped);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => node.emit(line_to_event(&line, &args.service, args.level)),
                Ok(None) => {
                    input_open = false;
                    if !node.state().is_hub() {
                        break;
                    }
                    tracing::info!("End of input; still serving as hub until signalled");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    input_open = false;
                    if !node.state().is_hub() {
                        break;
                    }
                }
            },
            _ = &mut signal => break,
            _ = &mut stopped => {
                tracing::warn!("Coordinator stopped on its own");
                break;
            }
        }
    }

    match node.shutdown().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Shutdown failed");
            ExitCode::FAILURE
        }
    }
}
