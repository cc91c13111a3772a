//! Per-entry field extraction
//!
//! Every field of a [`Record`] is resolved by one rule from [`FIELD_RULES`].
//! A rule selects `atom:*` children of the entry, optionally filtered on one
//! attribute, and reads either an attribute or the element text. When several
//! elements match, the first one in document order that yields a non-empty
//! value wins.

use crate::feed::document::ATOM_NS;
use roxmltree::Node;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One scene as published to the broker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Catalog-assigned unique id, the deduplication key
    pub id: String,
    /// Human readable product name
    pub identifier: String,
    /// URL of the alternative (detail) representation
    pub metadata: String,
    /// URL of the downloadable asset
    pub download: String,
    /// Scene coverage as a WKT polygon
    pub footprint: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Entry has no id")]
    MissingId,
}

/// Record fields filled by extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Identifier,
    Metadata,
    Download,
    Footprint,
}

/// What a rule reads from a matching element
#[derive(Debug, Clone, Copy)]
enum Select {
    Attribute(&'static str),
    Text,
}

/// Query for one field: `atom:<element>[@<attr>='<value>']` then [`Select`]
#[derive(Debug, Clone, Copy)]
struct FieldRule {
    field: Field,
    element: &'static str,
    filter: Option<(&'static str, &'static str)>,
    select: Select,
}

/// `atom:link[@rel='alternative']/@href` and friends, one per field
const FIELD_RULES: [FieldRule; 5] = [
    FieldRule {
        field: Field::Metadata,
        element: "link",
        filter: Some(("rel", "alternative")),
        select: Select::Attribute("href"),
    },
    FieldRule {
        field: Field::Download,
        element: "link",
        filter: None,
        select: Select::Attribute("href"),
    },
    FieldRule {
        field: Field::Footprint,
        element: "str",
        filter: Some(("name", "footprint")),
        select: Select::Text,
    },
    FieldRule {
        field: Field::Id,
        element: "id",
        filter: None,
        select: Select::Text,
    },
    FieldRule {
        field: Field::Identifier,
        element: "str",
        filter: Some(("name", "identifier")),
        select: Select::Text,
    },
];

impl FieldRule {
    fn resolve(&self, entry: Node<'_, '_>) -> Option<String> {
        entry
            .children()
            .filter(|n| n.has_tag_name((ATOM_NS, self.element)))
            .filter(|n| match self.filter {
                Some((attr, value)) => n.attribute(attr) == Some(value),
                None => true,
            })
            .filter_map(|n| match self.select {
                Select::Attribute(attr) => n.attribute(attr),
                Select::Text => n.text(),
            })
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Extracts a record from one `atom:entry` node
///
/// Missing optional fields become empty strings. Elements outside the Atom
/// namespace are ignored.
///
/// # Returns
///
/// * `Ok(Record)` - The entry has a non-empty `atom:id`
/// * `Err(ExtractError::MissingId)` - It does not; the caller skips the entry
pub fn extract(entry: Node<'_, '_>) -> Result<Record, ExtractError> {
    let mut record = Record::default();

    for rule in &FIELD_RULES {
        let value = rule.resolve(entry).unwrap_or_default();
        match rule.field {
            Field::Id => record.id = value,
            Field::Identifier => record.identifier = value,
            Field::Metadata => record.metadata = value,
            Field::Download => record.download = value,
            Field::Footprint => record.footprint = value,
        }
    }

    if record.id.is_empty() {
        return Err(ExtractError::MissingId);
    }

    Ok(record)
}
