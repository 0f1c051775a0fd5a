//! Implementation of `shoal serve`.

use std::{process::ExitCode, sync::Arc};

use shoal_cluster::{RpcService, serve};
use shoal_config::ConfigWarning;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use crate::cli::{args::ServeCommand, context::CommandContext};

/// Serves the local indexes until interrupted.
pub fn run(ctx: &CommandContext, cmd: &ServeCommand) -> ExitCode {
    let mut config = ctx.config.clone();
    if let Some(listen) = &cmd.listen {
        match listen.parse() {
            Ok(addr) => config.server.listen = addr,
            Err(_) => {
                eprintln!("error: invalid listen address '{listen}'");
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(dir) = &cmd.data_dir {
        config.server.data_dir.clone_from(dir);
    }
    // A server needs no peers of its own.
    for warning in config.validate() {
        if warning != ConfigWarning::NoNodes {
            warn!(%warning, "configuration warning");
        }
    }

    let runtime = match ctx.runtime() {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    runtime.block_on(async move {
        let service = match RpcService::open(&config) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        };
        let listener = match TcpListener::bind(config.server.listen).await {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("error: failed to bind {}: {e}", config.server.listen);
                return ExitCode::FAILURE;
            }
        };
        if config.server.queue_mode {
            info!(
                workers = config.server.queue_workers,
                capacity = config.server.queue_capacity,
                "queued mode enabled"
            );
        }

        let served = serve(listener, Arc::clone(&service), shutdown_signal()).await;
        let drained = service.shutdown().await;
        match served.and(drained) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        }
    })
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        return;
    }
    info!("shutting down");
}
