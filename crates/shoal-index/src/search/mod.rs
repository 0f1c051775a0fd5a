//! Search execution.
//!
//! Without sort keys, hits come straight from the engine's top-k by score and the
//! page is applied by the collector. With sort keys, a bounded candidate window is
//! collected by score, ordered in memory by the stored values, and paged after
//! sorting.

mod highlight;
mod sort;
#[cfg(test)]
mod tests;

use shoal_query::{HitDoc, QueryOpt, SearchResult};
use tantivy::{
    DocAddress, Searcher, TantivyDocument,
    collector::{Count, TopDocs},
};

use self::highlight::Highlighter;
use crate::{
    IndexError, IndexHandle,
    document::{StoredDoc, decode_stored},
};

/// A hit loaded from the store, before paging and conversion.
pub(crate) struct Candidate {
    /// Engine score.
    pub score: f32,
    /// Stored engine document, kept for highlighting.
    pub doc: TantivyDocument,
    /// Decoded id and source.
    pub stored: StoredDoc,
}

#[allow(clippy::multiple_inherent_impl)]
impl IndexHandle {
    /// Runs a query and returns one page of hits with the total match count.
    pub fn search(&self, opt: &QueryOpt) -> Result<SearchResult, IndexError> {
        let mut compiler = self.compiler();
        let query = compiler.compile(opt)?;
        let page = opt.page();
        let searcher = self.searcher();

        let (total, candidates) = if opt.sort.is_empty() {
            let collector = (
                Count,
                TopDocs::with_limit(page.size).and_offset(page.offset),
            );
            let (total, top) = searcher
                .search(&query, &collector)
                .map_err(|e| IndexError::search(&e))?;
            (total, self.load(&searcher, top)?)
        } else {
            let window = self.sort_window().max(page.offset.saturating_add(page.size));
            let collector = (Count, TopDocs::with_limit(window));
            let (total, top) = searcher
                .search(&query, &collector)
                .map_err(|e| IndexError::search(&e))?;
            let mut candidates = self.load(&searcher, top)?;
            sort::sort_candidates(&mut candidates, &opt.sort);
            let page_hits = candidates
                .into_iter()
                .skip(page.offset)
                .take(page.size)
                .collect();
            (total, page_hits)
        };

        let highlighter = if opt.highlight {
            Some(Highlighter::new(&searcher, &mut compiler, opt)?)
        } else {
            None
        };

        let records = candidates
            .into_iter()
            .map(|candidate| {
                let highlights = highlighter
                    .as_ref()
                    .map(|h| h.fragments(&candidate.doc))
                    .unwrap_or_default();
                HitDoc {
                    id: candidate.stored.id,
                    score: candidate.score,
                    fields: opt.need_docs.then_some(candidate.stored.source),
                    highlights,
                }
            })
            .collect();

        Ok(SearchResult {
            total: total as u64,
            records,
        })
    }

    /// Loads and decodes stored documents for scored addresses.
    fn load(
        &self,
        searcher: &Searcher,
        top: Vec<(f32, DocAddress)>,
    ) -> Result<Vec<Candidate>, IndexError> {
        top.into_iter()
            .map(|(score, address)| {
                let doc: TantivyDocument =
                    searcher.doc(address).map_err(|e| IndexError::search(&e))?;
                let stored = decode_stored(self.schema(), &doc)?;
                Ok(Candidate { score, doc, stored })
            })
            .collect()
    }
}
