//! Facet aggregation over the documents matching a query.
//!
//! Each term spec becomes one engine terms aggregation. Each numeric range
//! becomes its own single-range aggregation, so ranges may overlap. Engine
//! aggregation names are internal; results are mapped back to their spec through
//! the name table built with the request.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use shoal_config::FieldType;
use shoal_query::{AggSpec, AggregateBucket, AggregateGroup, QueryOpt};
use tantivy::aggregation::{
    AggregationCollector, AggregationLimits,
    agg_req::{Aggregation, AggregationVariants, Aggregations},
    bucket::{RangeAggregation, RangeAggregationRange, TermsAggregation},
};

use crate::{IndexError, IndexHandle, schema::IndexSchema};

/// What an engine aggregation name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Term buckets of `specs[spec]`.
    Terms { spec: usize },
    /// Range `range` of `specs[spec]`.
    Range { spec: usize, range: usize },
}

/// Builds aggregation requests for a set of specs and maps results back.
pub struct Aggregator<'a> {
    specs: &'a [AggSpec],
    slots: BTreeMap<String, Slot>,
}

impl<'a> Aggregator<'a> {
    /// Validates the specs against the schema.
    ///
    /// Term facets need a keyword, numeric, date or bool field. Range facets need
    /// a numeric field and ranges with `from < to`.
    pub fn new(schema: &IndexSchema, specs: &'a [AggSpec]) -> Result<Self, IndexError> {
        let mut slots = BTreeMap::new();
        for (index, spec) in specs.iter().enumerate() {
            spec.validate()?;
            let mapped = schema.require(&spec.field)?;
            if spec.is_numeric {
                if !matches!(mapped.ty, FieldType::F64 | FieldType::I64) {
                    return Err(IndexError::FieldType {
                        field: spec.field.clone(),
                        actual: mapped.ty,
                        usage: "range aggregations",
                    });
                }
                for (range_index, range) in spec.numeric_ranges.iter().enumerate() {
                    if range.from.is_nan() || range.to.is_nan() || range.from >= range.to {
                        return Err(IndexError::InvalidAggregation(format!(
                            "range [{}, {}) on '{}' is empty",
                            range.from, range.to, spec.field
                        )));
                    }
                    slots.insert(
                        format!("{index}:{}#{range_index}", spec.field),
                        Slot::Range {
                            spec: index,
                            range: range_index,
                        },
                    );
                }
            } else {
                if matches!(mapped.ty, FieldType::Text | FieldType::Geo) {
                    return Err(IndexError::FieldType {
                        field: spec.field.clone(),
                        actual: mapped.ty,
                        usage: "term aggregations",
                    });
                }
                slots.insert(format!("{index}:{}", spec.field), Slot::Terms { spec: index });
            }
        }
        Ok(Self { specs, slots })
    }

    /// Returns true when there is nothing for the engine to compute.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Builds the engine aggregation request.
    pub fn request(&self) -> Aggregations {
        self.slots
            .iter()
            .map(|(name, slot)| {
                let variant = match *slot {
                    Slot::Terms { spec } => {
                        let spec = &self.specs[spec];
                        AggregationVariants::Terms(TermsAggregation {
                            field: spec.field.clone(),
                            size: Some(u32::try_from(spec.effective_size()).unwrap_or(u32::MAX)),
                            ..TermsAggregation::default()
                        })
                    }
                    Slot::Range { spec, range } => {
                        let spec = &self.specs[spec];
                        let bounds = spec.numeric_ranges[range];
                        AggregationVariants::Range(RangeAggregation {
                            field: spec.field.clone(),
                            ranges: vec![RangeAggregationRange {
                                key: Some(spec.range_name(&bounds)),
                                from: Some(bounds.from),
                                to: Some(bounds.to),
                            }],
                            keyed: false,
                        })
                    }
                };
                let aggregation = Aggregation {
                    agg: variant,
                    sub_aggregation: Aggregations::default(),
                };
                (name.clone(), aggregation)
            })
            .collect::<HashMap<_, _>>()
    }

    /// Maps serialized engine results back onto one group per spec, in spec order.
    ///
    /// Result entries whose name is not in the request are skipped.
    pub fn collect(&self, results: &Value) -> Vec<AggregateGroup> {
        let mut groups: Vec<AggregateGroup> = self
            .specs
            .iter()
            .map(|spec| AggregateGroup {
                field: spec.field.clone(),
                buckets: Vec::new(),
            })
            .collect();
        // Range buckets are gathered per range index so output follows request order.
        let mut ranges: BTreeMap<(usize, usize), Vec<AggregateBucket>> = BTreeMap::new();

        let Some(entries) = results.as_object() else {
            return groups;
        };
        for (name, result) in entries {
            let Some(slot) = self.slots.get(name) else {
                continue;
            };
            let buckets = result
                .get("buckets")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            match *slot {
                Slot::Terms { spec } => {
                    groups[spec].buckets = buckets
                        .iter()
                        .map(|bucket| AggregateBucket {
                            name: bucket_key(bucket),
                            min: None,
                            max: None,
                            count: doc_count(bucket),
                        })
                        .collect();
                }
                Slot::Range { spec, range } => {
                    let spec_ref = &self.specs[spec];
                    let bounds = spec_ref.numeric_ranges[range];
                    let wanted = spec_ref.range_name(&bounds);
                    let matched = buckets
                        .iter()
                        .filter(|bucket| bucket.get("key").and_then(Value::as_str) == Some(wanted.as_str()))
                        .map(|bucket| AggregateBucket {
                            name: wanted.clone(),
                            min: Some(bounds.from),
                            max: Some(bounds.to),
                            count: doc_count(bucket),
                        });
                    ranges.entry((spec, range)).or_default().extend(matched);
                }
            }
        }
        for ((spec, _), buckets) in ranges {
            groups[spec].buckets.extend(buckets);
        }
        groups
    }
}

/// Renders a term bucket key. Dates and booleans carry a string form; whole
/// numbers print without a fraction.
fn bucket_key(bucket: &Value) -> String {
    if let Some(text) = bucket.get("key_as_string").and_then(Value::as_str) {
        return text.to_string();
    }
    match bucket.get("key") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => match number.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => number.to_string(),
        },
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Reads a bucket's document count.
fn doc_count(bucket: &Value) -> u64 {
    bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0)
}

#[allow(clippy::multiple_inherent_impl)]
impl IndexHandle {
    /// Computes the facets requested in `opt.agg_specs` over the documents the
    /// rest of `opt` matches.
    pub fn aggregate(&self, opt: &QueryOpt) -> Result<Vec<AggregateGroup>, IndexError> {
        let query = self.compiler().compile(opt)?;
        let aggregator = Aggregator::new(self.schema(), &opt.agg_specs)?;
        if aggregator.is_empty() {
            return Ok(aggregator.collect(&Value::Null));
        }

        let collector =
            AggregationCollector::from_aggs(aggregator.request(), AggregationLimits::default());
        let results = self
            .searcher()
            .search(&query, &collector)
            .map_err(|e| IndexError::search(&e))?;
        let serialized = serde_json::to_value(&results)
            .map_err(|e| IndexError::Search(format!("unreadable aggregation result: {e}")))?;
        Ok(aggregator.collect(&serialized))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use shoal_config::{Mapping, SearchSettings};
    use shoal_query::{Filter, FilterSpec, RangeVal};
    use tempfile::TempDir;

    use super::*;

    fn create_test_index(temp: &TempDir) -> IndexHandle {
        let mapping: Mapping = [
            ("title", FieldType::Text),
            ("brand", FieldType::Keyword),
            ("price", FieldType::F64),
            ("published", FieldType::Bool),
        ]
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect();
        let handle = IndexHandle::create_or_open(
            "products",
            &temp.path().join("products"),
            &mapping,
            &SearchSettings::default(),
        )
        .unwrap();
        let docs = [
            ("p1", json!({"title": "rust book", "brand": "acme", "price": 5.0, "published": true})),
            ("p2", json!({"title": "rust mug", "brand": "acme", "price": 7.5, "published": true})),
            ("p3", json!({"title": "pan", "brand": "globex", "price": 10.0, "published": false})),
        ];
        handle
            .index_many(docs.iter().map(|(id, doc)| (*id, doc)))
            .unwrap();
        handle
    }

    fn range(from: f64, to: f64) -> RangeVal {
        RangeVal { from, to }
    }

    fn counts(group: &AggregateGroup) -> Vec<(&str, u64)> {
        group
            .buckets
            .iter()
            .map(|b| (b.name.as_str(), b.count))
            .collect()
    }

    #[test]
    fn term_facets_count_values() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let opt = QueryOpt {
            agg_specs: vec![AggSpec::terms("brand", 0)],
            ..QueryOpt::default()
        };
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].field, "brand");
        assert_eq!(counts(&groups[0]), vec![("acme", 2), ("globex", 1)]);
        assert!(groups[0].buckets.iter().all(|b| b.min.is_none() && b.max.is_none()));
    }

    #[test]
    fn facets_only_count_matching_documents() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let mut opt = QueryOpt::matching("rust");
        opt.agg_specs = vec![AggSpec::terms("brand", 10)];
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(counts(&groups[0]), vec![("acme", 2)]);
    }

    #[test]
    fn bool_facets_use_string_keys() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let opt = QueryOpt {
            agg_specs: vec![AggSpec::terms("published", 10)],
            ..QueryOpt::default()
        };
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(counts(&groups[0]), vec![("true", 2), ("false", 1)]);
    }

    #[test]
    fn overlapping_ranges_are_counted_independently() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let opt = QueryOpt {
            agg_specs: vec![AggSpec::ranges(
                "price",
                vec![range(0.0, 6.0), range(5.0, 11.0)],
            )],
            ..QueryOpt::default()
        };
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(counts(&groups[0]), vec![("price-0", 1), ("price-5", 3)]);
        assert_eq!(groups[0].buckets[1].min, Some(5.0));
        assert_eq!(groups[0].buckets[1].max, Some(11.0));
    }

    #[test]
    fn sub_integer_lower_bounds_share_a_name() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let opt = QueryOpt {
            agg_specs: vec![AggSpec::ranges(
                "price",
                vec![range(5.2, 8.0), range(5.7, 11.0)],
            )],
            ..QueryOpt::default()
        };
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(counts(&groups[0]), vec![("price-5", 1), ("price-5", 2)]);
    }

    #[test]
    fn numeric_spec_without_ranges_is_empty() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let opt = QueryOpt {
            agg_specs: vec![AggSpec::ranges("price", vec![])],
            ..QueryOpt::default()
        };
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].buckets.is_empty());
    }

    #[test]
    fn groups_follow_spec_order() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        let mut opt = QueryOpt::default();
        opt.agg_specs = vec![
            AggSpec::ranges("price", vec![range(0.0, 100.0)]),
            AggSpec::terms("brand", 1),
        ];
        opt.filters.push(Filter::must(FilterSpec::Boolean {
            field: "published".into(),
            val: true,
        }));
        let groups = handle.aggregate(&opt).unwrap();
        assert_eq!(groups[0].field, "price");
        assert_eq!(counts(&groups[0]), vec![("price-0", 2)]);
        assert_eq!(counts(&groups[1]), vec![("acme", 2)]);
    }

    #[test]
    fn rejects_unsuitable_fields() {
        let temp = TempDir::new().unwrap();
        let handle = create_test_index(&temp);
        for spec in [
            AggSpec::terms("title", 5),
            AggSpec::terms("missing", 5),
            AggSpec::ranges("brand", vec![range(0.0, 1.0)]),
            AggSpec::ranges("price", vec![range(3.0, 3.0)]),
        ] {
            let opt = QueryOpt {
                agg_specs: vec![spec],
                ..QueryOpt::default()
            };
            assert!(handle.aggregate(&opt).unwrap_err().is_validation());
        }
    }

    #[test]
    fn unknown_result_entries_are_skipped() {
        let schema = IndexSchema::from_mapping(
            &[("brand".to_string(), FieldType::Keyword)].into_iter().collect(),
        );
        let specs = [AggSpec::terms("brand", 5)];
        let aggregator = Aggregator::new(&schema, &specs).unwrap();
        let results = json!({
            "0:brand": {"buckets": [{"key": "acme", "doc_count": 4}], "sum_other_doc_count": 0},
            "stray": {"buckets": [{"key": "x", "doc_count": 1}], "sum_other_doc_count": 0}
        });
        let groups = aggregator.collect(&results);
        assert_eq!(groups.len(), 1);
        assert_eq!(counts(&groups[0]), vec![("acme", 4)]);
    }
}
