//! Clap argument definitions for the `shoal` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use shoal_query::QueryKind;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "shoal")]
#[command(about = "Replicated full-text search over tantivy")]
pub struct Cli {
    /// Configuration file (default: ./shoal.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported `shoal` subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Serve the local indexes to peers
    Serve(ServeCommand),

    /// Write a commented shoal.toml in the current directory
    Init(InitCommand),

    /// Print the effective configuration
    Config,

    /// Create an index on every node
    CreateIndex {
        /// Index tag
        tag: String,
    },

    /// Insert or replace a document on every node
    Sync {
        /// Index tag
        tag: String,
        /// Document id
        id: String,
        /// Document body as a JSON object
        json: String,
    },

    /// Delete documents on every node
    Remove {
        /// Index tag
        tag: String,
        /// Document ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Fetch documents by id
    Get {
        /// Index tag
        tag: String,
        /// Document ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Search an index
    Query(QueryCommand),

    /// Add or look up suggestions
    #[command(subcommand)]
    Suggest(SuggestCommand),
}

/// Arguments for `shoal serve`.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeCommand {
    /// Listen address, overriding server.listen
    #[arg(long)]
    pub listen: Option<String>,

    /// Data directory, overriding server.data_dir
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Arguments for `shoal init`.
#[derive(Args, Debug, Clone, Default)]
pub struct InitCommand {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `shoal query`.
#[derive(Args, Debug, Clone)]
pub struct QueryCommand {
    /// Index tag
    pub tag: String,

    /// Query text
    #[arg(short, long, default_value = "")]
    pub key: String,

    /// Fields to search (default: all text fields)
    #[arg(short, long = "field")]
    pub fields: Vec<String>,

    /// Query kind: match_all, term, match_query, phrase, match_phrase, prefix
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<QueryKind>,

    /// One-based page number
    #[arg(long, default_value = "1")]
    pub page: i64,

    /// Hits per page [default: 10]
    #[arg(long, default_value = "0")]
    pub page_size: i64,

    /// Count term buckets for a field instead of returning hits (repeatable)
    #[arg(long = "agg")]
    pub aggs: Vec<String>,

    /// Include stored documents in hits
    #[arg(long)]
    pub docs: bool,

    /// Include highlighted fragments in hits
    #[arg(long)]
    pub highlight: bool,
}

/// `shoal suggest` subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SuggestCommand {
    /// Offer a suggestion; stored counts only ever grow
    Add {
        /// Suggest tag
        tag: String,
        /// Suggestion text
        key: String,
        /// Popularity count
        #[arg(default_value = "1")]
        count: i64,
    },

    /// Look up suggestions, highest count first
    Get {
        /// Suggest tag
        tag: String,
        /// Lookup text
        #[arg(default_value = "")]
        key: String,
        /// Match by prefix instead of whole words
        #[arg(long)]
        prefix: bool,
        /// Entries to return
        #[arg(short = 'n', long, default_value = "10")]
        limit: i64,
    },
}

/// Parses a query kind from its wire name.
fn parse_kind(s: &str) -> Result<QueryKind, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_flags() {
        let cli = Cli::try_parse_from([
            "shoal", "query", "t1", "--key", "ru", "--kind", "prefix", "-f", "title", "--agg",
            "brand",
        ])
        .unwrap();
        let Commands::Query(cmd) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(cmd.kind, Some(QueryKind::Prefix));
        assert_eq!(cmd.fields, vec!["title"]);
        assert_eq!(cmd.aggs, vec!["brand"]);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["shoal", "query", "t1", "--kind", "fuzzy"]).is_err());
    }
}
