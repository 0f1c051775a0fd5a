//! Query options: the abstract description a caller submits.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AggSpec, Filter, QueryError};

/// Records per page when neither `size` nor `page_size` is given.
pub const REC_PER_PAGE: usize = 10;

/// Largest page a single query may request.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Deepest offset a query may page to.
pub const MAX_OFFSET: usize = 100_000;

/// Default field for geo-distance queries.
pub const DEFAULT_GEO_FIELD: &str = "location";

/// Mean Earth radius in meters, used for geo bounding boxes.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Primary query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Matches every document.
    MatchAll,
    /// Exact, untokenized term on one field.
    Term,
    /// Analyzed match of any token of the key.
    MatchQuery,
    /// Analyzed phrase.
    Phrase,
    /// Analyzed phrase; identical to `Phrase` for this engine.
    MatchPhrase,
    /// Prefix match on the last token of the key.
    Prefix,
    /// Points within a distance of a center.
    GeoDistance,
}

impl QueryKind {
    /// Returns the wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MatchAll => "match_all",
            Self::Term => "term",
            Self::MatchQuery => "match_query",
            Self::Phrase => "phrase",
            Self::MatchPhrase => "match_phrase",
            Self::Prefix => "prefix",
            Self::GeoDistance => "geo_distance",
        }
    }

    /// Returns true for kinds that analyze `key` against text fields.
    pub fn uses_key(self) -> bool {
        matches!(
            self,
            Self::MatchQuery | Self::Phrase | Self::MatchPhrase | Self::Prefix | Self::Term
        )
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::MatchAll,
            Self::Term,
            Self::MatchQuery,
            Self::Phrase,
            Self::MatchPhrase,
            Self::Prefix,
            Self::GeoDistance,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| QueryError::UnknownKind(s.to_string()))
    }
}

/// One sort key. The first entry in a sort list has the highest priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Field to sort by.
    pub field: String,
    /// Ascending when true, descending otherwise.
    #[serde(default)]
    pub ascending: bool,
}

impl SortField {
    /// Sorts ascending by `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    /// Sorts descending by `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Center and radius of a geo-distance query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoDistance {
    /// Geo field name.
    #[serde(default = "default_geo_field")]
    pub field: String,
    /// Center longitude in degrees.
    pub lon: f64,
    /// Center latitude in degrees.
    pub lat: f64,
    /// Radius in meters.
    pub distance: f64,
}

/// Serde default for [`GeoDistance::field`].
fn default_geo_field() -> String {
    DEFAULT_GEO_FIELD.to_string()
}

/// Latitude and longitude bounds, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBox {
    /// Southern bound.
    pub min_lat: f64,
    /// Northern bound.
    pub max_lat: f64,
    /// Western bound.
    pub min_lon: f64,
    /// Eastern bound.
    pub max_lon: f64,
}

impl GeoDistance {
    /// Checks coordinate ranges and radius.
    pub fn validate(&self) -> Result<(), QueryError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(QueryError::InvalidGeo(format!("lat {} out of range", self.lat)));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(QueryError::InvalidGeo(format!("lon {} out of range", self.lon)));
        }
        if self.distance.is_nan() || self.distance <= 0.0 {
            return Err(QueryError::InvalidGeo(format!(
                "distance {} must be positive",
                self.distance
            )));
        }
        Ok(())
    }

    /// Returns the box that circumscribes the search circle.
    ///
    /// Longitude spread widens towards the poles and is clamped to the full range.
    pub fn bounding_box(&self) -> GeoBox {
        let dlat = (self.distance / EARTH_RADIUS_M).to_degrees();
        let cos_lat = self.lat.to_radians().cos();
        let dlon = if cos_lat.abs() < 1e-12 {
            180.0
        } else {
            (dlat / cos_lat).min(180.0)
        };
        GeoBox {
            min_lat: (self.lat - dlat).max(-90.0),
            max_lat: (self.lat + dlat).min(90.0),
            min_lon: (self.lon - dlon).max(-180.0),
            max_lon: (self.lon + dlon).min(180.0),
        }
    }
}

/// Resolved offset and size of a result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Number of hits to skip.
    pub offset: usize,
    /// Number of hits to return.
    pub size: usize,
}

impl Page {
    /// Resolves paging parameters.
    ///
    /// A positive `size` selects `offset/size` directly, clamping a negative offset
    /// to zero. Otherwise `page` (default 1) and `page_size` (default
    /// [`REC_PER_PAGE`]) derive the window. The size is capped at
    /// [`MAX_PAGE_SIZE`] and the offset at [`MAX_OFFSET`].
    pub fn resolve(offset: i64, size: i64, page: i64, page_size: i64) -> Self {
        let (offset, size) = Self::requested(offset, size, page, page_size);
        Self {
            offset: offset.min(MAX_OFFSET),
            size: size.min(MAX_PAGE_SIZE),
        }
    }

    /// Checks that the parameters stay within [`MAX_PAGE_SIZE`] and
    /// [`MAX_OFFSET`] before any clamping.
    pub fn check(offset: i64, size: i64, page: i64, page_size: i64) -> Result<(), QueryError> {
        let (offset, size) = Self::requested(offset, size, page, page_size);
        if size > MAX_PAGE_SIZE || offset > MAX_OFFSET {
            return Err(QueryError::PageOutOfRange { offset, size });
        }
        Ok(())
    }

    /// The unclamped window, saturating instead of overflowing.
    fn requested(offset: i64, size: i64, page: i64, page_size: i64) -> (usize, usize) {
        if size > 0 {
            return (
                usize::try_from(offset).unwrap_or(0),
                usize::try_from(size).unwrap_or(usize::MAX),
            );
        }
        let page = usize::try_from(page).ok().filter(|p| *p > 0).unwrap_or(1);
        let page_size = usize::try_from(page_size)
            .ok()
            .filter(|s| *s > 0)
            .unwrap_or(REC_PER_PAGE);
        ((page - 1).saturating_mul(page_size), page_size)
    }
}

/// The abstract query a caller submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOpt {
    /// Query text.
    pub key: String,
    /// Fields the key applies to; empty means the engine default field.
    pub fields: Vec<String>,
    /// Primary query kind; derived from `key` when unset.
    pub query_kind: Option<QueryKind>,
    /// Parameters for [`QueryKind::GeoDistance`].
    pub geo: Option<GeoDistance>,
    /// Filters combined into a boolean query.
    pub filters: Vec<Filter>,
    /// Sort keys in priority order; empty sorts by score.
    pub sort: Vec<SortField>,
    /// Hits to skip when `size > 0`.
    pub offset: i64,
    /// Page size; takes precedence over `page/page_size` when positive.
    pub size: i64,
    /// One-based page number.
    pub page: i64,
    /// Hits per page.
    pub page_size: i64,
    /// Generate highlight fragments.
    pub highlight: bool,
    /// Return decoded documents with each hit.
    pub need_docs: bool,
    /// Facet requests for aggregation queries.
    pub agg_specs: Vec<AggSpec>,
    /// Suggest tag for suggestion queries.
    pub suggest_tag: String,
}

impl Default for QueryOpt {
    fn default() -> Self {
        Self {
            key: String::new(),
            fields: Vec::new(),
            query_kind: None,
            geo: None,
            filters: Vec::new(),
            sort: Vec::new(),
            offset: 0,
            size: 0,
            page: 0,
            page_size: 0,
            highlight: false,
            need_docs: true,
            agg_specs: Vec::new(),
            suggest_tag: String::new(),
        }
    }
}

impl QueryOpt {
    /// A match query for `key` across the default field.
    pub fn matching(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Decodes options from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, QueryError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Returns the primary query kind, applying the default rule.
    ///
    /// Without an explicit kind, a non-empty key selects `MatchQuery` and an empty
    /// key selects `MatchAll`.
    pub fn effective_kind(&self) -> QueryKind {
        self.query_kind.unwrap_or(if self.key.is_empty() {
            QueryKind::MatchAll
        } else {
            QueryKind::MatchQuery
        })
    }

    /// Returns the resolved result page.
    pub fn page(&self) -> Page {
        Page::resolve(self.offset, self.size, self.page, self.page_size)
    }

    /// Checks that the options describe a compilable query.
    pub fn validate(&self) -> Result<(), QueryError> {
        Page::check(self.offset, self.size, self.page, self.page_size)?;
        let kind = self.effective_kind();
        match kind {
            QueryKind::Term if self.fields.is_empty() => {
                return Err(QueryError::MissingField { kind });
            }
            QueryKind::GeoDistance => match &self.geo {
                Some(geo) => geo.validate()?,
                None => return Err(QueryError::MissingGeo),
            },
            _ => {}
        }
        if kind.uses_key() && self.key.trim().is_empty() {
            return Err(QueryError::MissingKey { kind });
        }
        for filter in &self.filters {
            filter.validate()?;
        }
        if self.sort.iter().any(|s| s.field.is_empty()) {
            return Err(QueryError::EmptySortField);
        }
        for spec in &self.agg_specs {
            spec.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::FilterSpec;

    #[test]
    fn kind_parses_wire_names() {
        assert_eq!("prefix".parse::<QueryKind>().unwrap(), QueryKind::Prefix);
        assert_eq!(
            "match_phrase".parse::<QueryKind>().unwrap(),
            QueryKind::MatchPhrase
        );
        assert!(matches!(
            "fuzzy".parse::<QueryKind>(),
            Err(QueryError::UnknownKind(name)) if name == "fuzzy"
        ));
    }

    #[test]
    fn default_kind_follows_key() {
        assert_eq!(QueryOpt::default().effective_kind(), QueryKind::MatchAll);
        assert_eq!(
            QueryOpt::matching("rust").effective_kind(),
            QueryKind::MatchQuery
        );
    }

    #[test]
    fn explicit_kind_wins() {
        let opt = QueryOpt {
            query_kind: Some(QueryKind::Prefix),
            key: "ru".into(),
            ..QueryOpt::default()
        };
        assert_eq!(opt.effective_kind(), QueryKind::Prefix);
    }

    #[test]
    fn page_from_page_number() {
        let opt = QueryOpt {
            page: 2,
            page_size: 10,
            ..QueryOpt::default()
        };
        assert_eq!(opt.page(), Page { offset: 10, size: 10 });
    }

    #[test]
    fn page_defaults() {
        assert_eq!(
            QueryOpt::default().page(),
            Page {
                offset: 0,
                size: REC_PER_PAGE
            }
        );
        assert_eq!(Page::resolve(0, 0, -3, -1), Page { offset: 0, size: 10 });
    }

    #[test]
    fn explicit_size_takes_precedence() {
        let opt = QueryOpt {
            offset: 7,
            size: 3,
            page: 5,
            page_size: 50,
            ..QueryOpt::default()
        };
        assert_eq!(opt.page(), Page { offset: 7, size: 3 });
    }

    #[test]
    fn negative_offset_clamps_to_zero() {
        assert_eq!(Page::resolve(-5, 4, 0, 0), Page { offset: 0, size: 4 });
    }

    #[test]
    fn huge_paging_is_clamped() {
        assert_eq!(
            Page::resolve(0, i64::MAX, 0, 0),
            Page {
                offset: 0,
                size: MAX_PAGE_SIZE
            }
        );
        assert_eq!(
            Page::resolve(i64::MAX, 10, 0, 0),
            Page {
                offset: MAX_OFFSET,
                size: 10
            }
        );
        assert_eq!(
            Page::resolve(0, 0, i64::MAX, 1_000_000_000),
            Page {
                offset: MAX_OFFSET,
                size: MAX_PAGE_SIZE
            }
        );
    }

    #[test]
    fn out_of_range_paging_is_rejected() {
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
            paged(0, 0, i64::MAX, 10),
        ] {
            assert!(
                matches!(opt.validate(), Err(QueryError::PageOutOfRange { .. })),
                "accepted {opt:?}"
            );
        }
        let deepest = QueryOpt {
            offset: i64::try_from(MAX_OFFSET).unwrap(),
            size: i64::try_from(MAX_PAGE_SIZE).unwrap(),
            ..QueryOpt::default()
        };
        deepest.validate().unwrap();
    }

    #[test]
    fn term_requires_field() {
        let opt = QueryOpt {
            key: "rust".into(),
            query_kind: Some(QueryKind::Term),
            ..QueryOpt::default()
        };
        assert!(matches!(
            opt.validate(),
            Err(QueryError::MissingField {
                kind: QueryKind::Term
            })
        ));
    }

    #[test]
    fn explicit_text_kind_requires_key() {
        let opt = QueryOpt {
            query_kind: Some(QueryKind::Phrase),
            ..QueryOpt::default()
        };
        assert!(matches!(opt.validate(), Err(QueryError::MissingKey { .. })));
    }

    #[test]
    fn geo_requires_parameters() {
        let opt = QueryOpt {
            query_kind: Some(QueryKind::GeoDistance),
            ..QueryOpt::default()
        };
        assert!(matches!(opt.validate(), Err(QueryError::MissingGeo)));

        let opt = QueryOpt {
            query_kind: Some(QueryKind::GeoDistance),
            geo: Some(GeoDistance {
                field: DEFAULT_GEO_FIELD.into(),
                lon: 10.0,
                lat: 95.0,
                distance: 100.0,
            }),
            ..QueryOpt::default()
        };
        assert!(matches!(opt.validate(), Err(QueryError::InvalidGeo(_))));
    }

    #[test]
    fn bounding_box_contains_center() {
        let geo = GeoDistance {
            field: DEFAULT_GEO_FIELD.into(),
            lon: 13.4,
            lat: 52.5,
            distance: 10_000.0,
        };
        let bbox = geo.bounding_box();
        assert!(bbox.min_lat < 52.5 && bbox.max_lat > 52.5);
        assert!(bbox.min_lon < 13.4 && bbox.max_lon > 13.4);
        // 10 km is roughly 0.09 degrees of latitude
        assert!((bbox.max_lat - 52.5 - 0.0899).abs() < 0.001);
        // longitude spread is wider than latitude spread away from the equator
        assert!(bbox.max_lon - 13.4 > bbox.max_lat - 52.5);
    }

    #[test]
    fn validate_checks_filters() {
        let opt = QueryOpt {
            filters: vec![Filter::must(FilterSpec::Prefix {
                field: String::new(),
                val: "a".into(),
            })],
            ..QueryOpt::default()
        };
        assert!(matches!(
            opt.validate(),
            Err(QueryError::EmptyFilterField { .. })
        ));
    }

    #[test]
    fn decodes_partial_json() {
        let opt = QueryOpt::from_json(
            json!({
                "key": "search engine",
                "fields": ["title"],
                "query_kind": "match_phrase",
                "sort": [{"field": "price", "ascending": true}],
                "page": 3
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(opt.effective_kind(), QueryKind::MatchPhrase);
        assert_eq!(opt.sort, vec![SortField::asc("price")]);
        assert!(opt.need_docs);
        assert_eq!(opt.page(), Page { offset: 20, size: 10 });
    }

    #[test]
    fn decode_error_is_reported() {
        let result = QueryOpt::from_json(b"{not json");
        assert!(matches!(result, Err(QueryError::Decode(_))));
    }
}
