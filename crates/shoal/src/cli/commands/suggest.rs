//! Implementation of `shoal suggest`.

use std::process::ExitCode;

use shoal_query::{QueryKind, QueryOpt, SuggestEntry};

use super::shared::{print_json, print_tally, with_client};
use crate::cli::{args::SuggestCommand, context::CommandContext};

/// Adds or looks up suggestions.
pub fn run(ctx: &CommandContext, cmd: &SuggestCommand) -> ExitCode {
    match cmd {
        SuggestCommand::Add { tag, key, count } => {
            let entry = SuggestEntry::new(key.as_str(), *count);
            with_client(ctx, async |client| {
                let tally = client.add_suggest(tag, &entry).await?;
                print_tally("sent", tally);
                Ok(())
            })
        }
        SuggestCommand::Get {
            tag,
            key,
            prefix,
            limit,
        } => {
            let opt = QueryOpt {
                key: key.clone(),
                query_kind: (*prefix && !key.is_empty()).then_some(QueryKind::Prefix),
                suggest_tag: tag.clone(),
                page: 1,
                page_size: *limit,
                ..QueryOpt::default()
            };
            with_client(ctx, async |client| {
                print_json(&client.suggest(tag, &opt).await?)
            })
        }
    }
}
