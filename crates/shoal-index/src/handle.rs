//! A single open index: schema, writer, reader and analyzer for one tag.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use serde_json::Value;
use shoal_config::{Mapping, SearchSettings};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
    collector::TopDocs,
    directory::MmapDirectory,
    query::TermQuery,
    schema::IndexRecordOption,
    tokenizer::TextAnalyzer,
};
use tracing::debug;

use crate::{
    IndexError,
    analyzer::{
        SHOAL_PREFIX_TOKENIZER, SHOAL_TOKENIZER, build_analyzer_from_name, build_prefix_analyzer,
    },
    document::{StoredDoc, build_document, decode_stored},
    query::QueryCompiler,
    schema::IndexSchema,
};

/// Writer heap budget; one indexing thread per index.
const WRITER_HEAP_SIZE: usize = 20_000_000;

/// An open index.
///
/// Writes are serialized through an internal lock and committed immediately, so
/// every successful write is visible to the next search.
pub struct IndexHandle {
    /// Tag the index is registered under.
    tag: String,
    /// Index directory.
    path: PathBuf,
    /// Schema with field handles.
    schema: IndexSchema,
    /// The single writer for this index.
    writer: Mutex<IndexWriter>,
    /// Reader, reloaded after each commit.
    reader: IndexReader,
    /// Analyzer shared by indexing and query compilation.
    analyzer: TextAnalyzer,
    /// Candidate window for custom sorting.
    sort_window: usize,
}

impl IndexHandle {
    /// Opens the index at `path`, creating it when the directory holds none.
    ///
    /// Fails if an existing index was created with a different mapping.
    pub fn create_or_open(
        tag: &str,
        path: &Path,
        mapping: &Mapping,
        settings: &SearchSettings,
    ) -> Result<Self, IndexError> {
        let schema = IndexSchema::from_mapping(mapping);
        let analyzer = build_analyzer_from_name(&settings.stemmer)?;

        fs::create_dir_all(path)?;
        let dir = MmapDirectory::open(path).map_err(|e| {
            let err: tantivy::TantivyError = e.into();
            IndexError::open_index(path.to_path_buf(), &err)
        })?;
        let index = Index::open_or_create(dir, schema.schema().clone())
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;
        index
            .tokenizers()
            .register(SHOAL_TOKENIZER, analyzer.clone());
        index
            .tokenizers()
            .register(SHOAL_PREFIX_TOKENIZER, build_prefix_analyzer());

        let writer = index
            .writer_with_num_threads(1, WRITER_HEAP_SIZE)
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;

        debug!(tag, path = %path.display(), "opened index");
        Ok(Self {
            tag: tag.to_string(),
            path: path.to_path_buf(),
            schema,
            writer: Mutex::new(writer),
            reader,
            analyzer,
            sort_window: settings.sort_window.max(1),
        })
    }

    /// Returns the tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the index directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the schema.
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Inserts or replaces the document with `id`.
    pub fn index(&self, id: &str, source: &Value) -> Result<(), IndexError> {
        self.index_many([(id, source)])
    }

    /// Inserts or replaces several documents in one commit.
    ///
    /// Every document is converted before anything is written, so a malformed
    /// document leaves the index untouched.
    pub fn index_many<'d>(
        &self,
        docs: impl IntoIterator<Item = (&'d str, &'d Value)>,
    ) -> Result<(), IndexError> {
        let mut prepared = Vec::new();
        for (id, source) in docs {
            if id.is_empty() {
                return Err(IndexError::InvalidDocument(
                    "document id must not be empty".to_string(),
                ));
            }
            prepared.push((id, build_document(&self.schema, id, source)?));
        }
        if prepared.is_empty() {
            return Ok(());
        }

        let mut writer = self.lock_writer()?;
        for (id, doc) in prepared {
            writer.delete_term(Term::from_field_text(self.schema.id, id));
            if let Err(e) = writer.add_document(doc) {
                if let Err(rollback) = writer.rollback() {
                    debug!(error = %rollback, "rollback after failed add");
                }
                return Err(IndexError::write(&e));
            }
        }
        self.commit(&mut writer)
    }

    /// Deletes the documents with the given ids. Unknown ids are ignored.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self.lock_writer()?;
        for id in ids {
            writer.delete_term(Term::from_field_text(self.schema.id, id.as_ref()));
        }
        self.commit(&mut writer)
    }

    /// Fetches one stored document.
    pub fn document(&self, id: &str) -> Result<Option<StoredDoc>, IndexError> {
        let searcher = self.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.schema.id, id),
            IndexRecordOption::Basic,
        );
        let top = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| IndexError::search(&e))?;
        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| IndexError::search(&e))?;
        decode_stored(&self.schema, &doc).map(Some)
    }

    /// Fetches the documents that exist, in request order.
    pub fn documents<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<StoredDoc>, IndexError> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            docs.extend(self.document(id.as_ref())?);
        }
        Ok(docs)
    }

    /// Returns the number of live documents.
    pub fn doc_count(&self) -> u64 {
        self.searcher().num_docs()
    }

    /// Returns a searcher over the last commit.
    pub(crate) fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Returns a query compiler for this index.
    pub fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(&self.schema, self.analyzer.clone())
    }

    /// Returns the candidate window for custom sorting.
    pub(crate) fn sort_window(&self) -> usize {
        self.sort_window
    }

    /// Locks the index writer.
    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>, IndexError> {
        self.writer
            .lock()
            .map_err(|_| IndexError::Write("index writer lock poisoned".to_string()))
    }

    /// Commits and reloads the reader.
    fn commit(&self, writer: &mut IndexWriter) -> Result<(), IndexError> {
        writer.commit().map_err(|e| IndexError::commit(&e))?;
        self.reader.reload().map_err(|e| IndexError::commit(&e))
    }
}
