//! Implementation of `shoal query`.

use std::process::ExitCode;

use shoal_query::{AggSpec, QueryOpt};

use super::shared::{print_json, with_client};
use crate::cli::{args::QueryCommand, context::CommandContext};

/// Runs a search, or a term aggregation when `--agg` is given.
pub fn run(ctx: &CommandContext, cmd: &QueryCommand) -> ExitCode {
    let opt = build_opt(cmd);
    if let Err(e) = opt.validate() {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }
    with_client(ctx, async |client| {
        if opt.agg_specs.is_empty() {
            print_json(&client.query(&cmd.tag, &opt).await?)
        } else {
            print_json(&client.aggregate(&cmd.tag, &opt).await?)
        }
    })
}

/// Translates command-line flags into query options.
fn build_opt(cmd: &QueryCommand) -> QueryOpt {
    QueryOpt {
        key: cmd.key.clone(),
        fields: cmd.fields.clone(),
        query_kind: cmd.kind,
        page: cmd.page,
        page_size: cmd.page_size,
        highlight: cmd.highlight,
        need_docs: cmd.docs,
        agg_specs: cmd
            .aggs
            .iter()
            .map(|field| AggSpec::terms(field.as_str(), 0))
            .collect(),
        ..QueryOpt::default()
    }
}

#[cfg(test)]
mod tests {
    use shoal_query::{Page, QueryKind};

    use super::*;

    fn command() -> QueryCommand {
        QueryCommand {
            tag: "t1".into(),
            key: "rust".into(),
            fields: vec!["title".into()],
            kind: Some(QueryKind::Prefix),
            page: 2,
            page_size: 5,
            aggs: Vec::new(),
            docs: true,
            highlight: false,
        }
    }

    #[test]
    fn flags_map_onto_options() {
        let opt = build_opt(&command());
        assert_eq!(opt.effective_kind(), QueryKind::Prefix);
        assert_eq!(opt.page(), Page { offset: 5, size: 5 });
        assert!(opt.need_docs);
        assert!(opt.agg_specs.is_empty());
    }

    #[test]
    fn agg_flags_become_term_specs() {
        let mut cmd = command();
        cmd.aggs = vec!["brand".into(), "color".into()];
        let opt = build_opt(&cmd);
        let fields: Vec<_> = opt.agg_specs.iter().map(|s| s.field.as_str()).collect();
        assert_eq!(fields, ["brand", "color"]);
        assert!(opt.agg_specs.iter().all(|s| !s.is_numeric));
    }
}
