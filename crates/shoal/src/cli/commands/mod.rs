//! Command implementations and dispatch.

pub mod config;
pub mod docs;
pub mod init;
pub mod query;
pub mod serve;
mod shared;
pub mod suggest;

use std::process::ExitCode;

use super::{args::Commands, context::CommandContext};

/// Dispatches to the selected subcommand.
pub fn run(command: Commands, ctx: &CommandContext) -> ExitCode {
    match command {
        Commands::Serve(cmd) => serve::run(ctx, &cmd),
        Commands::Init(cmd) => init::run(ctx, &cmd),
        Commands::Config => config::run(ctx),
        Commands::CreateIndex { tag } => docs::create_index(ctx, &tag),
        Commands::Sync { tag, id, json } => docs::sync(ctx, &tag, &id, &json),
        Commands::Remove { tag, ids } => docs::remove(ctx, &tag, &ids),
        Commands::Get { tag, ids } => docs::get(ctx, &tag, &ids),
        Commands::Query(cmd) => query::run(ctx, &cmd),
        Commands::Suggest(cmd) => suggest::run(ctx, &cmd),
    }
}
