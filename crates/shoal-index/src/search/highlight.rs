//! Highlight fragments for search hits.

use std::collections::BTreeMap;

use shoal_query::QueryOpt;
use tantivy::{Searcher, TantivyDocument, snippet::SnippetGenerator};

use crate::{IndexError, query::QueryCompiler, schema::ALL_FIELD};

/// Maximum characters in one fragment.
const FRAGMENT_MAX_CHARS: usize = 150;

/// One snippet generator per highlighted text field.
pub(super) struct Highlighter {
    generators: Vec<(String, SnippetGenerator)>,
}

impl Highlighter {
    /// Prepares generators for the queried text fields, or for every mapped text
    /// field when the query names none.
    ///
    /// Each generator looks for the key's analyzed terms in its own field, so hits
    /// found through `_all` are highlighted in the fields that hold the text.
    pub(super) fn new(
        searcher: &Searcher,
        compiler: &mut QueryCompiler<'_>,
        opt: &QueryOpt,
    ) -> Result<Self, IndexError> {
        let schema = compiler.schema();
        let targets: Vec<(String, _)> = if opt.fields.is_empty() {
            schema
                .text_fields()
                .map(|(name, field)| (name.to_string(), field))
                .collect()
        } else {
            opt.fields
                .iter()
                .filter(|name| name.as_str() != ALL_FIELD)
                .filter_map(|name| {
                    schema
                        .text_fields()
                        .find(|(candidate, _)| candidate == name)
                        .map(|(_, field)| (name.clone(), field))
                })
                .collect()
        };

        let mut generators = Vec::new();
        if opt.key.trim().is_empty() {
            return Ok(Self { generators });
        }
        for (name, field) in targets {
            let Some(query) = compiler.matching(&name, &opt.key)? else {
                continue;
            };
            let mut generator = SnippetGenerator::create(searcher, query.as_ref(), field)
                .map_err(|e| IndexError::search(&e))?;
            generator.set_max_num_chars(FRAGMENT_MAX_CHARS);
            generators.push((name, generator));
        }
        Ok(Self { generators })
    }

    /// Returns the non-empty fragments for a document, keyed by field.
    pub(super) fn fragments(&self, doc: &TantivyDocument) -> BTreeMap<String, String> {
        self.generators
            .iter()
            .filter_map(|(name, generator)| {
                let snippet = generator.snippet_from_doc(doc);
                (!snippet.is_empty()).then(|| (name.clone(), snippet.to_html()))
            })
            .collect()
    }
}
