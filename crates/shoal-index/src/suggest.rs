//! Suggestion indexes with asynchronous, count-dominant upserts.
//!
//! Every suggest tag has its own reserved index, `__suggester_<tag>`, holding one
//! document per key. Writes go through a bounded queue drained by a single
//! consumer thread, which applies them in submission order and only replaces a
//! stored entry when the incoming count is strictly greater.

use std::{
    sync::{
        Arc,
        mpsc::{self, Receiver, SyncSender, TrySendError},
    },
    thread,
};

use serde_json::json;
use shoal_config::{FieldType, Mapping};
use shoal_query::{QueryKind, QueryOpt, SuggestEntry, SuggestList, SuggestOpt};
use tantivy::{
    Order, TantivyDocument,
    collector::{Count, TopDocs},
};
use tracing::{debug, warn};

use crate::{
    IndexError, IndexHandle, document::decode_stored, hash::content_id, registry::IndexRegistry,
};

/// Name prefix of the reserved suggestion indexes.
pub const SUGGEST_PREFIX: &str = "__suggester_";

/// Suggestion text field.
const KEY_FIELD: &str = "key";
/// Popularity count field.
const COUNT_FIELD: &str = "count";

/// Returns the index tag backing the suggestions for `tag`.
pub fn suggest_tag(tag: &str) -> String {
    format!("{SUGGEST_PREFIX}{tag}")
}

/// The fixed mapping of every suggestion index.
pub(crate) fn suggest_mapping() -> Mapping {
    [
        (KEY_FIELD.to_string(), FieldType::Text),
        (COUNT_FIELD.to_string(), FieldType::I64),
    ]
    .into_iter()
    .collect()
}

/// Work for the consumer thread.
enum SuggestOp {
    /// Upsert one entry under the dominance rule.
    Add { tag: String, entry: SuggestEntry },
    /// Acknowledge once everything queued before has been applied.
    Flush(SyncSender<()>),
}

/// Suggestion indexes sharing one upsert queue.
pub struct SuggestIndex {
    registry: Arc<IndexRegistry>,
    tx: SyncSender<SuggestOp>,
}

impl SuggestIndex {
    /// Starts the consumer thread with a queue of `capacity` entries.
    pub fn start(registry: Arc<IndexRegistry>, capacity: usize) -> Result<Self, IndexError> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let consumer = Arc::clone(&registry);
        thread::Builder::new()
            .name("shoal-suggest".to_string())
            .spawn(move || consume(&consumer, &rx))?;
        Ok(Self { registry, tx })
    }

    /// Creates the suggestion index for `tag` if it does not exist.
    pub fn register_suggest(&self, tag: &str) -> Result<(), IndexError> {
        if tag.is_empty() {
            return Err(IndexError::InvalidTag(tag.to_string()));
        }
        self.registry
            .add_index_with(&suggest_tag(tag), &suggest_mapping())
            .map(|_| ())
    }

    /// Queues `entry` for upsert into the suggestions of `tag`.
    ///
    /// Returns once the entry is queued. Failures while applying it are logged.
    pub fn add_suggest(&self, tag: &str, entry: SuggestEntry) -> Result<(), IndexError> {
        if entry.key.trim().is_empty() {
            return Err(IndexError::InvalidDocument(
                "suggestion key must not be empty".to_string(),
            ));
        }
        let op = SuggestOp::Add {
            tag: tag.to_string(),
            entry,
        };
        self.tx.try_send(op).map_err(|e| match e {
            TrySendError::Full(_) => IndexError::QueueFull,
            TrySendError::Disconnected(_) => IndexError::Closed,
        })
    }

    /// Blocks until every entry queued before this call has been applied.
    pub fn flush(&self) -> Result<(), IndexError> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.tx
            .send(SuggestOp::Flush(ack_tx))
            .map_err(|_| IndexError::Closed)?;
        ack_rx.recv().map_err(|_| IndexError::Closed)
    }

    /// Looks up suggestions ordered by count, highest first.
    pub fn get_suggest(&self, opt: &SuggestOpt) -> Result<SuggestList, IndexError> {
        let handle = self
            .registry
            .get_index(&suggest_tag(&opt.tag))
            .map_err(|_| IndexError::UnknownIndex(opt.tag.clone()))?;

        let kind = match opt.query_kind {
            _ if opt.key.trim().is_empty() => QueryKind::MatchAll,
            Some(kind @ (QueryKind::MatchPhrase | QueryKind::Prefix | QueryKind::MatchQuery)) => {
                kind
            }
            // A bare key with no kind is a plain match.
            None => QueryKind::MatchQuery,
            Some(_) => QueryKind::MatchAll,
        };
        let query = handle.compiler().compile(&QueryOpt {
            key: opt.key.clone(),
            fields: vec![KEY_FIELD.to_string()],
            query_kind: Some(kind),
            ..QueryOpt::default()
        })?;

        let page = opt.page();
        let top = TopDocs::with_limit(page.size.max(1))
            .and_offset(page.offset)
            .order_by_fast_field::<i64>(COUNT_FIELD, Order::Desc);
        let searcher = handle.searcher();
        let (total, hits) = searcher
            .search(&query, &(Count, top))
            .map_err(|e| IndexError::search(&e))?;

        let mut list = Vec::with_capacity(hits.len());
        for (_, address) in hits {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| IndexError::search(&e))?;
            let stored = decode_stored(handle.schema(), &doc)?;
            let key = stored
                .source
                .get(KEY_FIELD)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let count = stored
                .source
                .get(COUNT_FIELD)
                .and_then(|v| v.as_i64())
                .unwrap_or_default();
            list.push(SuggestEntry::new(key, count));
        }
        Ok(SuggestList {
            total: total as u64,
            list,
        })
    }
}

/// Drains the queue until every sender is gone.
fn consume(registry: &IndexRegistry, rx: &Receiver<SuggestOp>) {
    while let Ok(op) = rx.recv() {
        match op {
            SuggestOp::Add { tag, entry } => {
                if let Err(e) = apply(registry, &tag, &entry) {
                    warn!(%tag, key = %entry.key, error = %e, "suggestion add failed");
                }
            }
            SuggestOp::Flush(ack) => {
                if ack.send(()).is_err() {
                    debug!("flush waiter went away");
                }
            }
        }
    }
    debug!("suggestion queue closed");
}

/// Applies one entry under the dominance rule.
fn apply(registry: &IndexRegistry, tag: &str, entry: &SuggestEntry) -> Result<(), IndexError> {
    let handle: Arc<IndexHandle> = registry
        .get_index(&suggest_tag(tag))
        .map_err(|_| IndexError::UnknownIndex(tag.to_string()))?;
    let id = content_id(&entry.key);
    let stored = handle
        .document(&id)?
        .and_then(|doc| doc.source.get(COUNT_FIELD).and_then(|v| v.as_i64()));
    if stored.is_some_and(|stored| stored >= entry.count) {
        debug!(
            tag,
            key = %entry.key,
            stored = stored.unwrap_or_default(),
            incoming = entry.count,
            "dropped dominated suggestion"
        );
        return Ok(());
    }
    handle.index(&id, &json!({ "key": entry.key, "count": entry.count }))
}

#[cfg(test)]
mod test {
    use shoal_config::{Mappings, SearchSettings};
    use tempfile::TempDir;

    use super::*;

    fn start(temp: &TempDir, capacity: usize) -> SuggestIndex {
        let registry = Arc::new(IndexRegistry::new(
            temp.path(),
            Mappings::default(),
            SearchSettings::default(),
        ));
        SuggestIndex::start(registry, capacity).unwrap()
    }

    fn all(index: &SuggestIndex, tag: &str) -> Vec<(String, i64)> {
        let opt = SuggestOpt {
            tag: tag.to_string(),
            page_size: 100,
            ..SuggestOpt::default()
        };
        index
            .get_suggest(&opt)
            .unwrap()
            .list
            .into_iter()
            .map(|e| (e.key, e.count))
            .collect()
    }

    #[test]
    fn higher_counts_dominate() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 16);
        index.register_suggest("t").unwrap();

        index.add_suggest("t", SuggestEntry::new("a", 5)).unwrap();
        index.add_suggest("t", SuggestEntry::new("a", 3)).unwrap();
        index.flush().unwrap();
        assert_eq!(all(&index, "t"), vec![("a".to_string(), 5)]);

        index.add_suggest("t", SuggestEntry::new("a", 9)).unwrap();
        index.flush().unwrap();
        assert_eq!(all(&index, "t"), vec![("a".to_string(), 9)]);
    }

    #[test]
    fn equal_count_is_dropped() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 16);
        index.register_suggest("t").unwrap();
        index.add_suggest("t", SuggestEntry::new("a", 5)).unwrap();
        index.add_suggest("t", SuggestEntry::new("a", 5)).unwrap();
        index.flush().unwrap();
        let list = index
            .get_suggest(&SuggestOpt {
                tag: "t".into(),
                ..SuggestOpt::default()
            })
            .unwrap();
        assert_eq!(list.total, 1);
    }

    #[test]
    fn results_are_ordered_by_count() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 16);
        index.register_suggest("t").unwrap();
        for (key, count) in [("rust", 2), ("rust book", 10), ("python", 7)] {
            index.add_suggest("t", SuggestEntry::new(key, count)).unwrap();
        }
        index.flush().unwrap();
        assert_eq!(
            all(&index, "t"),
            vec![
                ("rust book".to_string(), 10),
                ("python".to_string(), 7),
                ("rust".to_string(), 2)
            ]
        );
    }

    #[test]
    fn prefix_lookup_pages() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 16);
        index.register_suggest("t").unwrap();
        for (key, count) in [("rust", 2), ("rustacean", 10), ("python", 7)] {
            index.add_suggest("t", SuggestEntry::new(key, count)).unwrap();
        }
        index.flush().unwrap();

        let opt = SuggestOpt {
            tag: "t".into(),
            key: "rus".into(),
            query_kind: Some(QueryKind::Prefix),
            page: 2,
            page_size: 1,
        };
        let list = index.get_suggest(&opt).unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.list, vec![SuggestEntry::new("rust", 2)]);
    }

    #[test]
    fn prefix_matches_partial_words() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 16);
        index.register_suggest("t").unwrap();
        for (key, count) in [("running shoes", 9), ("national park", 4)] {
            index.add_suggest("t", SuggestEntry::new(key, count)).unwrap();
        }
        index.flush().unwrap();

        let lookup = |key: &str| {
            let opt = SuggestOpt {
                tag: "t".into(),
                key: key.into(),
                query_kind: Some(QueryKind::Prefix),
                page: 1,
                page_size: 10,
            };
            index
                .get_suggest(&opt)
                .unwrap()
                .list
                .into_iter()
                .map(|e| e.key)
                .collect::<Vec<_>>()
        };
        for key in ["run", "runni", "running", "Running sho"] {
            assert_eq!(lookup(key), vec!["running shoes"], "key {key:?}");
        }
        assert_eq!(lookup("nationa"), vec!["national park"]);
        assert!(lookup("runx").is_empty());
    }

    #[test]
    fn unregistered_tag_is_not_found() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 16);
        let err = index
            .get_suggest(&SuggestOpt {
                tag: "missing".into(),
                ..SuggestOpt::default()
            })
            .unwrap_err();
        assert!(matches!(err, IndexError::UnknownIndex(tag) if tag == "missing"));

        // Adds to an unknown tag are accepted and dropped by the consumer.
        index
            .add_suggest("missing", SuggestEntry::new("a", 1))
            .unwrap();
        index.flush().unwrap();
    }

    #[test]
    fn full_queue_is_reported() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 1);
        index.register_suggest("t").unwrap();
        let mut saw_full = false;
        for count in 0..10_000 {
            match index.add_suggest("t", SuggestEntry::new("k", count)) {
                Ok(()) => {}
                Err(IndexError::QueueFull) => {
                    saw_full = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(saw_full);
    }

    #[test]
    fn empty_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 4);
        assert!(
            index
                .add_suggest("t", SuggestEntry::new(" ", 1))
                .unwrap_err()
                .is_validation()
        );
    }

    #[test]
    fn ids_are_key_digests() {
        let temp = TempDir::new().unwrap();
        let index = start(&temp, 4);
        index.register_suggest("t").unwrap();
        index.add_suggest("t", SuggestEntry::new("a", 1)).unwrap();
        index.flush().unwrap();
        let handle = index.registry.get_index(&suggest_tag("t")).unwrap();
        assert!(handle.document(&content_id("a")).unwrap().is_some());
    }
}
