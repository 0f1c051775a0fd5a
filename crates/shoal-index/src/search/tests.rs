use serde_json::{Value, json};
use shoal_config::{FieldType, Mapping, SearchSettings};
use shoal_query::{
    Filter, FilterSpec, GeoDistance, MAX_OFFSET, MAX_PAGE_SIZE, QueryError, QueryKind, QueryOpt,
    SearchResult, SortField,
};
use tempfile::TempDir;

use crate::{IndexError, IndexHandle};

fn product_mapping() -> Mapping {
    [
        ("title", FieldType::Text),
        ("body", FieldType::Text),
        ("brand", FieldType::Keyword),
        ("price", FieldType::F64),
        ("stock", FieldType::I64),
        ("created", FieldType::Date),
        ("published", FieldType::Bool),
        ("location", FieldType::Geo),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty))
    .collect()
}

fn products() -> Vec<(&'static str, Value)> {
    vec![
        (
            "p1",
            json!({
                "title": "Rust programming guide",
                "body": "Learn error handling and ownership in Rust.",
                "brand": "acme",
                "price": 5.0,
                "stock": 5,
                "created": "2024-01-01T00:00:00Z",
                "published": true,
                "location": {"lat": 48.8566, "lon": 2.3522}
            }),
        ),
        (
            "p2",
            json!({
                "title": "Async Rust in depth",
                "body": "Handling errors across await points.",
                "brand": "globex",
                "price": 7.5,
                "stock": 6,
                "created": "2024-02-01T00:00:00Z",
                "published": false,
                "location": {"lat": 48.86, "lon": 2.35}
            }),
        ),
        (
            "p3",
            json!({
                "title": "Cooking with cast iron",
                "body": "Seasoning and care for your pan.",
                "brand": "initech",
                "price": 10.0,
                "stock": 10,
                "created": "2024-03-01T00:00:00Z",
                "published": true,
                "location": {"lat": 40.7128, "lon": -74.0060}
            }),
        ),
        (
            "p4",
            json!({
                "title": "Handling edge cases",
                "brand": "acme",
                "published": true
            }),
        ),
    ]
}

fn create_test_index(temp: &TempDir) -> IndexHandle {
    let handle = IndexHandle::create_or_open(
        "products",
        &temp.path().join("products"),
        &product_mapping(),
        &SearchSettings::default(),
    )
    .unwrap();
    let docs = products();
    handle
        .index_many(docs.iter().map(|(id, doc)| (*id, doc)))
        .unwrap();
    handle
}

fn ids(result: &SearchResult) -> Vec<&str> {
    result.records.iter().map(|hit| hit.id.as_str()).collect()
}

fn sorted_ids(result: &SearchResult) -> Vec<&str> {
    let mut ids = ids(result);
    ids.sort_unstable();
    ids
}

fn filtered(filter: Filter) -> QueryOpt {
    QueryOpt {
        filters: vec![filter],
        ..QueryOpt::default()
    }
}

#[test]
fn single_document_round_trip() {
    let temp = TempDir::new().unwrap();
    let handle = IndexHandle::create_or_open(
        "t1",
        &temp.path().join("t1"),
        &Mapping::new(),
        &SearchSettings::default(),
    )
    .unwrap();
    handle.index("d1", &json!({"title": "a"})).unwrap();

    let result = handle.search(&QueryOpt::matching("a")).unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(ids(&result), vec!["d1"]);
}

#[test]
fn match_searches_all_by_default() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let result = handle.search(&QueryOpt::matching("handling")).unwrap();
    assert_eq!(sorted_ids(&result), vec!["p1", "p2", "p4"]);
}

#[test]
fn match_on_named_field() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = QueryOpt {
        key: "handling".into(),
        fields: vec!["title".into()],
        ..QueryOpt::default()
    };
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p4"]);
}

#[test]
fn phrase_requires_order() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt {
        key: "error handling".into(),
        fields: vec!["body".into()],
        query_kind: Some(QueryKind::Phrase),
        ..QueryOpt::default()
    };
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p1"]);

    opt.key = "ownership error".into();
    assert_eq!(handle.search(&opt).unwrap().total, 0);
}

#[test]
fn prefix_matches_partial_last_token() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = QueryOpt {
        key: "cook".into(),
        fields: vec!["title".into()],
        query_kind: Some(QueryKind::Prefix),
        ..QueryOpt::default()
    };
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p3"]);
}

#[test]
fn prefix_sees_words_past_their_stem() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    for key in ["programmi", "rust programmi"] {
        let opt = QueryOpt {
            key: key.into(),
            query_kind: Some(QueryKind::Prefix),
            ..QueryOpt::default()
        };
        assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p1"], "key {key:?}");
    }
}

#[test]
fn term_on_keyword_is_exact() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt {
        key: "acme".into(),
        fields: vec!["brand".into()],
        query_kind: Some(QueryKind::Term),
        ..QueryOpt::default()
    };
    assert_eq!(sorted_ids(&handle.search(&opt).unwrap()), vec!["p1", "p4"]);

    opt.key = "ACME".into();
    assert_eq!(handle.search(&opt).unwrap().total, 0);
}

#[test]
fn numeric_range_is_half_open() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = filtered(Filter::must(FilterSpec::NumericRange {
        field: "price".into(),
        min: Some(5.0),
        max: Some(10.0),
    }));
    assert_eq!(sorted_ids(&handle.search(&opt).unwrap()), vec!["p1", "p2"]);
}

#[test]
fn integer_range_rounds_fractional_bounds() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = filtered(Filter::must(FilterSpec::NumericRange {
        field: "stock".into(),
        min: Some(5.5),
        max: Some(9.5),
    }));
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p2"]);
}

#[test]
fn date_range_is_half_open() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = filtered(Filter::must(FilterSpec::DateRange {
        field: "created".into(),
        start: Some("2024-01-01T00:00:00Z".parse().unwrap()),
        end: Some("2024-03-01T00:00:00Z".parse().unwrap()),
    }));
    assert_eq!(sorted_ids(&handle.search(&opt).unwrap()), vec!["p1", "p2"]);
}

#[test]
fn exclude_filter_removes_matches() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt::matching("rust");
    opt.filters.push(Filter::exclude(FilterSpec::TermsQuery {
        field: "brand".into(),
        terms: vec![],
        val: "globex".into(),
    }));
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p1"]);
}

#[test]
fn exclude_phrase_removes_matches() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = filtered(Filter::should(FilterSpec::ExcludePhrase {
        field: "title".into(),
        val: "cast iron".into(),
    }));
    assert_eq!(sorted_ids(&handle.search(&opt).unwrap()), vec!["p1", "p2", "p4"]);
}

#[test]
fn boolean_filter() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = filtered(Filter::must(FilterSpec::Boolean {
        field: "published".into(),
        val: false,
    }));
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p2"]);
}

#[test]
fn sub_doc_ids_restrict_hits() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt::matching("rust");
    opt.filters.push(Filter::must(FilterSpec::SubDocIds {
        doc_ids: vec!["p2".into(), "p3".into()],
    }));
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p2"]);
}

#[test]
fn match_range_over_keywords() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = filtered(Filter::must(FilterSpec::MatchRange {
        field: "brand".into(),
        min: Some("b".into()),
        max: Some("i".into()),
    }));
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p2"]);
}

#[test]
fn should_filters_only_score_under_must() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = QueryOpt {
        query_kind: Some(QueryKind::MatchAll),
        filters: vec![
            Filter::should(FilterSpec::Match {
                field: "title".into(),
                terms: vec!["cooking".into(), "async".into()],
                val: String::new(),
            }),
            Filter::must(FilterSpec::Boolean {
                field: "published".into(),
                val: true,
            }),
        ],
        ..QueryOpt::default()
    };
    // Under a must clause, should clauses only affect scoring.
    assert_eq!(sorted_ids(&handle.search(&opt).unwrap()), vec!["p1", "p3", "p4"]);
}

#[test]
fn geo_distance_finds_nearby_points() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = QueryOpt {
        query_kind: Some(QueryKind::GeoDistance),
        geo: Some(GeoDistance {
            field: "location".into(),
            lon: 2.35,
            lat: 48.857,
            distance: 5_000.0,
        }),
        ..QueryOpt::default()
    };
    assert_eq!(sorted_ids(&handle.search(&opt).unwrap()), vec!["p1", "p2"]);
}

#[test]
fn paging_by_page_and_by_offset() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt {
        sort: vec![SortField::asc("brand"), SortField::asc("title")],
        page: 2,
        page_size: 3,
        ..QueryOpt::default()
    };
    let result = handle.search(&opt).unwrap();
    assert_eq!(result.total, 4);
    assert_eq!(ids(&result), vec!["p3"]);

    opt.offset = 1;
    opt.size = 2;
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p1", "p2"]);
}

#[test]
fn huge_paging_is_rejected_without_panicking() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let paged = |offset, size, page, page_size| QueryOpt {
        offset,
        size,
        page,
        page_size,
        ..QueryOpt::default()
    };
    for opt in [
        paged(0, i64::MAX, 0, 0),
        paged(i64::MAX, 10, 0, 0),
        paged(0, 0, i64::MAX, 1_000_000_000),
    ] {
        let err = handle.search(&opt).unwrap_err();
        assert!(
            matches!(err, IndexError::InvalidQuery(QueryError::PageOutOfRange { .. })),
            "got {err:?}"
        );
    }

    let deepest = paged(
        i64::try_from(MAX_OFFSET).unwrap(),
        i64::try_from(MAX_PAGE_SIZE).unwrap(),
        0,
        0,
    );
    let result = handle.search(&deepest).unwrap();
    assert_eq!(result.total, 4);
    assert!(result.records.is_empty());
}

#[test]
fn sort_by_priority_with_missing_last() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt {
        sort: vec![SortField::desc("price")],
        ..QueryOpt::default()
    };
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p3", "p2", "p1", "p4"]);

    opt.sort = vec![SortField::asc("price")];
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p1", "p2", "p3", "p4"]);

    opt.sort = vec![SortField::desc("brand"), SortField::asc("price")];
    assert_eq!(ids(&handle.search(&opt).unwrap()), vec!["p3", "p2", "p1", "p4"]);
}

#[test]
fn need_docs_controls_fields() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt::matching("cooking");
    let hit = &handle.search(&opt).unwrap().records[0];
    assert_eq!(hit.fields.as_ref().unwrap()["brand"], "initech");

    opt.need_docs = false;
    let hit = &handle.search(&opt).unwrap().records[0];
    assert!(hit.fields.is_none());
}

#[test]
fn highlights_mark_terms_in_text_fields() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let mut opt = QueryOpt::matching("seasoning");
    opt.highlight = true;
    let result = handle.search(&opt).unwrap();
    let highlights = &result.records[0].highlights;
    assert!(highlights["body"].contains("<b>Seasoning</b>"));
    assert!(!highlights.contains_key("title"));
}

#[test]
fn no_highlights_unless_requested() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let result = handle.search(&QueryOpt::matching("seasoning")).unwrap();
    assert!(result.records[0].highlights.is_empty());
}

#[test]
fn invalid_options_fail_before_search() {
    let temp = TempDir::new().unwrap();
    let handle = create_test_index(&temp);
    let opt = QueryOpt {
        query_kind: Some(QueryKind::Phrase),
        ..QueryOpt::default()
    };
    assert!(handle.search(&opt).unwrap_err().is_validation());
}
