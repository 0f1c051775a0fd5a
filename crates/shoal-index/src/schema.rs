//! Index schema built from a field mapping.
//!
//! Every index carries three reserved fields:
//! - `_id`: the document id (raw, stored)
//! - `_source`: the original JSON document (stored only)
//! - `_all`: analyzed catch-all text, the default query field
//!
//! Mapped fields are added per type. Geo fields become two fast `f64`
//! sub-fields named `<field>.lat` and `<field>.lon`. Each text field, `_all`
//! included, gets an unstemmed companion `<field>._prefix` that prefix queries
//! run against.

use std::collections::BTreeMap;

use shoal_config::{FieldType, Mapping};
use tantivy::{
    DateTimePrecision,
    schema::{
        DateOptions, FAST, Field, INDEXED, IndexRecordOption, STORED, STRING, Schema,
        TextFieldIndexing, TextOptions,
    },
};

use crate::{
    IndexError,
    analyzer::{SHOAL_PREFIX_TOKENIZER, SHOAL_TOKENIZER},
};

/// Reserved document id field.
pub const ID_FIELD: &str = "_id";
/// Reserved stored-source field.
pub const SOURCE_FIELD: &str = "_source";
/// Reserved catch-all text field.
pub const ALL_FIELD: &str = "_all";
/// Suffix of the unstemmed companion of a text field.
pub const PREFIX_SUFFIX: &str = "._prefix";

/// A mapped field handle with its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedField {
    /// Tantivy field handle.
    pub field: Field,
    /// Declared type.
    pub ty: FieldType,
}

/// The two sub-fields backing a geo point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoFields {
    /// Latitude field.
    pub lat: Field,
    /// Longitude field.
    pub lon: Field,
}

/// Handles to every field in an index schema.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The underlying Tantivy schema.
    schema: Schema,
    /// Document id.
    pub id: Field,
    /// Stored original document.
    pub source: Field,
    /// Catch-all analyzed text.
    pub all: Field,
    /// Mapped scalar fields by name.
    fields: BTreeMap<String, MappedField>,
    /// Mapped geo fields by name.
    geo: BTreeMap<String, GeoFields>,
    /// Unstemmed companion of each text field.
    prefix: BTreeMap<Field, Field>,
}

/// Options for analyzed text fields.
fn analyzed_text() -> TextOptions {
    indexed_with(SHOAL_TOKENIZER)
}

/// Text indexing with positions under `tokenizer`.
fn indexed_with(tokenizer: &str) -> TextOptions {
    TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(tokenizer)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    )
}

impl IndexSchema {
    /// Builds the schema for a mapping.
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let mut builder = Schema::builder();

        let id = builder.add_text_field(ID_FIELD, STRING | STORED);
        let source = builder.add_text_field(SOURCE_FIELD, STORED);
        let all = builder.add_text_field(ALL_FIELD, analyzed_text());
        let mut prefix = BTreeMap::new();
        prefix.insert(
            all,
            builder.add_text_field(
                &format!("{ALL_FIELD}{PREFIX_SUFFIX}"),
                indexed_with(SHOAL_PREFIX_TOKENIZER),
            ),
        );

        let mut fields = BTreeMap::new();
        let mut geo = BTreeMap::new();
        for (name, ty) in mapping {
            let field = match ty {
                FieldType::Text => builder.add_text_field(name, analyzed_text().set_stored()),
                FieldType::Keyword => builder.add_text_field(name, STRING | STORED | FAST),
                FieldType::F64 => builder.add_f64_field(name, INDEXED | STORED | FAST),
                FieldType::I64 => builder.add_i64_field(name, INDEXED | STORED | FAST),
                FieldType::Bool => builder.add_bool_field(name, INDEXED | STORED | FAST),
                FieldType::Date => builder.add_date_field(
                    name,
                    DateOptions::default()
                        .set_indexed()
                        .set_stored()
                        .set_fast()
                        .set_precision(DateTimePrecision::Microseconds),
                ),
                FieldType::Geo => {
                    let lat = builder.add_f64_field(&format!("{name}.lat"), INDEXED | FAST);
                    let lon = builder.add_f64_field(&format!("{name}.lon"), INDEXED | FAST);
                    geo.insert(name.clone(), GeoFields { lat, lon });
                    continue;
                }
            };
            if *ty == FieldType::Text {
                let companion = builder.add_text_field(
                    &format!("{name}{PREFIX_SUFFIX}"),
                    indexed_with(SHOAL_PREFIX_TOKENIZER),
                );
                prefix.insert(field, companion);
            }
            fields.insert(name.clone(), MappedField { field, ty: *ty });
        }

        Self {
            schema: builder.build(),
            id,
            source,
            all,
            fields,
            geo,
            prefix,
        }
    }

    /// Returns the underlying Tantivy schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Looks up a scalar field. `_all` resolves as a text field.
    pub fn field(&self, name: &str) -> Option<MappedField> {
        if name == ALL_FIELD {
            return Some(MappedField {
                field: self.all,
                ty: FieldType::Text,
            });
        }
        self.fields.get(name).copied()
    }

    /// Looks up a scalar field, failing with `UnknownField` when absent.
    pub fn require(&self, name: &str) -> Result<MappedField, IndexError> {
        self.field(name)
            .ok_or_else(|| IndexError::UnknownField(name.to_string()))
    }

    /// Returns the unstemmed companion of a text field.
    pub fn prefix_field(&self, field: Field) -> Option<Field> {
        self.prefix.get(&field).copied()
    }

    /// Looks up a geo field.
    pub fn geo(&self, name: &str) -> Option<GeoFields> {
        self.geo.get(name).copied()
    }

    /// Returns the field name for a handle.
    pub fn name(&self, field: Field) -> &str {
        self.schema.get_field_name(field)
    }

    /// Iterates mapped scalar fields in name order.
    pub fn mapped(&self) -> impl Iterator<Item = (&str, MappedField)> {
        self.fields.iter().map(|(name, mapped)| (name.as_str(), *mapped))
    }

    /// Iterates mapped text fields in name order.
    pub fn text_fields(&self) -> impl Iterator<Item = (&str, Field)> {
        self.mapped()
            .filter(|(_, mapped)| mapped.ty == FieldType::Text)
            .map(|(name, mapped)| (name, mapped.field))
    }
}
