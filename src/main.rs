//! replserver binary entry point
//!
//! # Usage
//!
//! ```bash
//! replserver --port 5051
//! replserver --config repl.toml --host 0.0.0.0
//! RUST_LOG=replserver=debug replserver
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;

use replserver::{Cli, ReplError, ReplServer, ScriptEvaluator, ServerEvent};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<ReplError>()
                .map(ReplError::exit_code)
                .unwrap_or(ExitCode::FAILURE)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "replserver=debug"
    } else {
        "replserver=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.server_config()?;
    let server = ReplServer::new(config, Arc::new(ScriptEvaluator::new()))?;

    let events = server.subscribe();
    let logger = tokio::spawn(log_events(events));

    server.start().await?;
    if let Some(addr) = server.local_addr() {
        println!("REPL server listening on {} (Ctrl-C to stop)", addr);
    }

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")
        }
        _ = wait_for_fault(&server) => {
            Err(anyhow::anyhow!("listener stopped unexpectedly"))
        }
    };

    server.stop().await?;
    logger.abort();
    outcome
}

/// Resolve once the server has left the running state on its own
async fn wait_for_fault(server: &ReplServer) {
    let mut events = server.subscribe();
    loop {
        match events.recv().await {
            Ok(ServerEvent::Fault { .. }) | Err(broadcast::error::RecvError::Closed) => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                if !server.running() {
                    return;
                }
            }
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<ServerEvent>) {
    loop {
        match events.recv().await {
            Ok(ServerEvent::SessionOpened { id, peer }) => {
                tracing::debug!(session = %id, %peer, "client connected");
            }
            Ok(ServerEvent::SessionClosed { id }) => {
                tracing::debug!(session = %id, "client disconnected");
            }
            Ok(ServerEvent::Fault { message }) => {
                tracing::error!("Server fault: {}", message);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Event logger skipped {} event(s)", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
