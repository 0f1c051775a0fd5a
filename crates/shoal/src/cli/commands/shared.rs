//! Shared helpers for the client commands.

use std::{process::ExitCode, sync::Arc};

use serde::Serialize;
use shoal_cluster::{Client, ClusterError, Tally};
use shoal_index::IndexRegistry;
use tracing::warn;

use crate::cli::context::CommandContext;

/// Connects to the configured nodes, runs `op`, and shuts the client down.
///
/// Errors from `op` print as `error: ...` and exit with failure.
pub fn with_client<F>(ctx: &CommandContext, op: F) -> ExitCode
where
    F: AsyncFnOnce(&Client) -> Result<(), ClusterError>,
{
    let settings = &ctx.config.client;
    if settings.nodes.is_empty() {
        eprintln!("error: no nodes configured");
        eprintln!("add client.nodes to shoal.toml or pass --config");
        return ExitCode::FAILURE;
    }
    let runtime = match ctx.runtime() {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };

    runtime.block_on(async {
        let registry = Arc::new(IndexRegistry::new(
            ctx.config.server.data_dir.clone(),
            ctx.config.mappings.clone(),
            ctx.config.search.clone(),
        ));
        let client = match Client::connect(registry, settings) {
            Ok(client) => client,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        };
        if !client.wait_ready(settings.rpc_timeout()).await {
            warn!("some nodes did not answer before the timeout");
        }

        let result = op(&client).await;
        client.quit().await;
        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        }
    })
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), ClusterError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ClusterError::Engine(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Reports a fan-out tally.
pub fn print_tally(action: &str, tally: Tally) {
    println!("{action} on {} node(s)", tally.succeed);
}
