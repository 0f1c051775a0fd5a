//! Implementations of `shoal create-index`, `sync`, `remove` and `get`.

use std::process::ExitCode;

use serde_json::Value;

use super::shared::{print_json, print_tally, with_client};
use crate::cli::context::CommandContext;

/// Creates an index on every node.
pub fn create_index(ctx: &CommandContext, tag: &str) -> ExitCode {
    with_client(ctx, async |client| {
        let tally = client.create_index(tag).await?;
        print_tally("created", tally);
        Ok(())
    })
}

/// Replicates one document.
pub fn sync(ctx: &CommandContext, tag: &str, id: &str, json: &str) -> ExitCode {
    let doc: Value = match serde_json::from_str(json) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("error: invalid document JSON: {e}");
            return ExitCode::FAILURE;
        }
    };
    with_client(ctx, async |client| {
        let tally = client.sync(tag, id, doc).await?;
        print_tally("queued", tally);
        Ok(())
    })
}

/// Replicates a delete.
pub fn remove(ctx: &CommandContext, tag: &str, ids: &[String]) -> ExitCode {
    with_client(ctx, async |client| {
        let tally = client.remove(tag, ids).await?;
        print_tally("queued", tally);
        Ok(())
    })
}

/// Prints the stored documents that exist among `ids`.
pub fn get(ctx: &CommandContext, tag: &str, ids: &[String]) -> ExitCode {
    with_client(ctx, async |client| {
        let docs = client.get(tag, ids).await?;
        print_json(&docs)
    })
}
