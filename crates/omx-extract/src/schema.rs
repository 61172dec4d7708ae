//! Schema registry and record normalizer
//!
//! Each entity type has an explicit, enumerated field list checked into the
//! engine. Normalization conforms every raw payload to exactly that field
//! set (closed schema): declared list fields are always present and never
//! null, declared scalar/nested fields are always present with null allowed,
//! and unknown incoming fields are dropped. Uniform partitions let the
//! downstream warehouse glob files from different runs without format drift.

use serde_json::{Map, Value};

/// One raw payload as returned by the source API.
pub type RawRecord = Value;

/// A raw record conformed to the registry's field list for its entity type.
pub type NormalizedRecord = Value;

/// Entity types the engine knows how to normalize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    /// EBI BioSamples sample documents.
    Biosample,
    /// NCBI BioProject study documents.
    Bioproject,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Biosample => "biosample",
            EntityType::Bioproject => "bioproject",
        }
    }
}

/// Type class of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single value; null when absent.
    Scalar,
    /// Sequence; empty when absent, never null.
    List,
    /// Nested structure passed through as-is; null when absent.
    Nested,
    /// A map of named groups re-shaped into a list of entries, each entry
    /// tagged with its group name under `entry_key`. Empty when absent.
    FlattenMap { entry_key: &'static str },
}

/// One declared field of an entity type
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn scalar(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Scalar,
    }
}

const fn list(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::List,
    }
}

/// Fields of an EBI BioSamples sample document. The `characteristics` map of
/// named attribute groups is flattened into one row per attribute value so
/// the warehouse can treat it as a repeated record.
const BIOSAMPLE_FIELDS: &[FieldDef] = &[
    scalar("accession"),
    scalar("name"),
    scalar("title"),
    scalar("description"),
    scalar("release"),
    scalar("update"),
    scalar("submitted"),
    scalar("taxId"),
    scalar("domain"),
    scalar("status"),
    scalar("webinSubmissionAccountId"),
    FieldDef {
        name: "characteristics",
        kind: FieldKind::FlattenMap {
            entry_key: "characteristic",
        },
    },
    list("relationships"),
    list("externalReferences"),
    list("organization"),
    list("contact"),
    list("publications"),
    list("structuredData"),
];

/// Fields of a BioProject study document.
const BIOPROJECT_FIELDS: &[FieldDef] = &[
    scalar("accession"),
    scalar("name"),
    scalar("title"),
    scalar("description"),
    list("data_types"),
    list("publications"),
    list("external_links"),
];

/// Lookup from entity type to its declared field list
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// The declared fields for an entity type.
    pub fn fields(entity: EntityType) -> &'static [FieldDef] {
        match entity {
            EntityType::Biosample => BIOSAMPLE_FIELDS,
            EntityType::Bioproject => BIOPROJECT_FIELDS,
        }
    }
}

/// Conform one raw payload to the registry's field list for `entity`.
///
/// Total and idempotent: a non-object input produces a record with every
/// field absent, and re-normalizing a normalized record is a no-op.
pub fn normalize(raw: &RawRecord, entity: EntityType) -> NormalizedRecord {
    let empty = Map::new();
    let source = raw.as_object().unwrap_or(&empty);

    let mut out = Map::with_capacity(SchemaRegistry::fields(entity).len());
    for field in SchemaRegistry::fields(entity) {
        let value = source.get(field.name);
        let conformed = match field.kind {
            FieldKind::Scalar | FieldKind::Nested => value.cloned().unwrap_or(Value::Null),
            FieldKind::List => conform_list(value),
            FieldKind::FlattenMap { entry_key } => flatten_map(value, entry_key),
        };
        out.insert(field.name.to_string(), conformed);
    }
    Value::Object(out)
}

/// A declared list is always a sequence: absent or null becomes empty, a
/// stray single value is wrapped.
fn conform_list(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(Value::Array(items)) => Value::Array(items.clone()),
        Some(other) => Value::Array(vec![other.clone()]),
    }
}

/// Flatten a map of named groups into a list of entries tagged with the group
/// name. An already-flattened array passes through unchanged.
fn flatten_map(value: Option<&Value>, entry_key: &str) -> Value {
    match value {
        Some(Value::Object(groups)) => {
            let mut entries = Vec::new();
            for (group, group_value) in groups {
                match group_value {
                    Value::Array(items) => {
                        for item in items {
                            entries.push(tag_entry(item, entry_key, group));
                        }
                    },
                    other => entries.push(tag_entry(other, entry_key, group)),
                }
            }
            Value::Array(entries)
        },
        Some(Value::Array(items)) => Value::Array(items.clone()),
        _ => Value::Array(Vec::new()),
    }
}

fn tag_entry(item: &Value, entry_key: &str, group: &str) -> Value {
    match item {
        Value::Object(fields) => {
            let mut entry = fields.clone();
            entry.insert(entry_key.to_string(), Value::String(group.to_string()));
            Value::Object(entry)
        },
        other => {
            let mut entry = Map::new();
            entry.insert(entry_key.to_string(), Value::String(group.to_string()));
            entry.insert("text".to_string(), other.clone());
            Value::Object(entry)
        },
    }
}
