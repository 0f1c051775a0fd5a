//! Compilation of query options into engine queries.
//!
//! The primary query is chosen by [`shoal_query::QueryKind`]:
//!
//! - **MatchAll**: every document
//! - **Term**: the raw key as one exact term on the first field
//! - **MatchQuery**: any analyzed token of the key
//! - **Phrase / MatchPhrase**: the analyzed tokens as a phrase
//! - **Prefix**: a phrase whose last token matches as a prefix
//! - **GeoDistance**: points inside the radius' bounding box
//!
//! Filters are compiled one by one and placed under must, should or must-not
//! next to the primary query, which always sits under must.

mod compile;
mod filter;

pub use compile::QueryCompiler;
use shoal_query::Occurrence;
use tantivy::query::Occur;

/// Maps a filter occurrence onto the engine's clause type.
fn occur(occurrence: Occurrence) -> Occur {
    match occurrence {
        Occurrence::Must => Occur::Must,
        Occurrence::Should => Occur::Should,
        Occurrence::MustNot => Occur::MustNot,
    }
}
