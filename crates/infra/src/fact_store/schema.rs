//! Target table schema: the columns the engine writes, additive reconciliation
//! against what the store already has, and a non-invasive audit.
//!
//! Schema evolution is append-only. A column the engine needs but the store
//! lacks is added as nullable; a column the store has but the engine no longer
//! writes is retained and left `NULL` on new rows, so it must be nullable.
//! Changing the type of an existing column, or a store-only `NOT NULL` column,
//! cannot be reconciled additively and is rejected.

use serde::{Deserialize, Serialize};

use super::r#trait::FactStoreError;

/// Logical column type, independent of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    BigInt,
    Boolean,
    Timestamp,
    Uuid,
    /// A store type the engine never writes.
    Other(String),
}

impl ColumnKind {
    pub fn sql_type(&self) -> &str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::BigInt => "BIGINT",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::Timestamp => "TIMESTAMPTZ",
            ColumnKind::Uuid => "UUID",
            ColumnKind::Other(name) => name,
        }
    }

    /// Interpret an `information_schema.columns.data_type` value.
    pub fn from_information_schema(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "text" | "character varying" => ColumnKind::Text,
            "bigint" => ColumnKind::BigInt,
            "boolean" => ColumnKind::Boolean,
            "timestamp with time zone" => ColumnKind::Timestamp,
            "uuid" => ColumnKind::Uuid,
            other => ColumnKind::Other(other.to_string()),
        }
    }
}

impl core::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.sql_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }

    fn nullable(name: &str, kind: ColumnKind) -> Self {
        Self::new(name, kind, true)
    }

    fn required(name: &str, kind: ColumnKind) -> Self {
        Self::new(name, kind, false)
    }
}

/// Columns forming the merge key. They cannot be added to an existing table.
pub const KEY_COLUMNS: [&str; 2] = ["listing_id", "updated_at"];

/// Every column written for a fact row, in insert order.
pub fn fact_columns() -> Vec<ColumnSpec> {
    use ColumnKind::*;

    vec![
        ColumnSpec::required("listing_id", BigInt),
        ColumnSpec::required("updated_at", Timestamp),
        ColumnSpec::required("listing_fingerprint", Text),
        ColumnSpec::nullable("product_key", Text),
        ColumnSpec::nullable("variant_key", Text),
        ColumnSpec::nullable("store_key", Text),
        ColumnSpec::nullable("vendor_key", Text),
        ColumnSpec::nullable("channel_key", Text),
        ColumnSpec::nullable("created_date_key", Text),
        ColumnSpec::nullable("stock_location_key", Text),
        ColumnSpec::nullable("taxon_key", Text),
        ColumnSpec::nullable("event_key", Text),
        ColumnSpec::nullable("product_id", BigInt),
        ColumnSpec::nullable("variant_id", BigInt),
        ColumnSpec::nullable("store_id", BigInt),
        ColumnSpec::nullable("vendor_id", BigInt),
        ColumnSpec::nullable("channel_id", BigInt),
        ColumnSpec::nullable("stock_location_id", BigInt),
        ColumnSpec::nullable("taxon_id", BigInt),
        ColumnSpec::nullable("event_type", Text),
        ColumnSpec::nullable("event_action", Text),
        ColumnSpec::nullable("stock_quantity", BigInt),
        ColumnSpec::nullable("price_minor", BigInt),
        ColumnSpec::nullable("currency", Text),
        ColumnSpec::nullable("is_approved", Boolean),
        ColumnSpec::nullable("is_published", Boolean),
        ColumnSpec::nullable("is_active", Boolean),
        ColumnSpec::nullable("has_stock", Boolean),
        ColumnSpec::nullable("created_at", Timestamp),
        ColumnSpec::nullable("deleted_at", Timestamp),
        ColumnSpec::required("extracted_at", Timestamp),
        ColumnSpec::required("batch_id", Uuid),
    ]
}

/// What has to happen to the target schema before rows can be merged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaPlan {
    /// The table does not exist yet and is created with every desired column.
    pub create_table: bool,
    /// Columns appended to an existing table (always nullable).
    pub add_columns: Vec<ColumnSpec>,
    /// Existing columns the engine no longer writes.
    pub retained_columns: Vec<String>,
    /// The full desired column set.
    pub desired: Vec<ColumnSpec>,
}

impl SchemaPlan {
    pub fn is_noop(&self) -> bool {
        !self.create_table && self.add_columns.is_empty()
    }
}

/// Plan an additive evolution from `existing` to `desired`.
///
/// An empty `existing` means the table is absent.
pub fn reconcile(
    existing: &[ColumnSpec],
    desired: &[ColumnSpec],
) -> Result<SchemaPlan, FactStoreError> {
    if existing.is_empty() {
        return Ok(SchemaPlan {
            create_table: true,
            desired: desired.to_vec(),
            ..SchemaPlan::default()
        });
    }

    for key in KEY_COLUMNS {
        if !existing.iter().any(|c| c.name == key) {
            return Err(FactStoreError::SchemaIncompatible(format!(
                "existing table has no merge key column '{key}'"
            )));
        }
    }

    let mut add_columns = Vec::new();
    for want in desired {
        match existing.iter().find(|c| c.name == want.name) {
            Some(have) if have.kind != want.kind => {
                return Err(FactStoreError::SchemaIncompatible(format!(
                    "column '{}' is {} in the store but written as {}",
                    want.name, have.kind, want.kind
                )));
            }
            Some(_) => {}
            None => add_columns.push(ColumnSpec::new(want.name.clone(), want.kind.clone(), true)),
        }
    }

    let mut retained_columns = Vec::new();
    for have in existing.iter().filter(|have| !desired.iter().any(|want| want.name == have.name)) {
        if !have.nullable {
            return Err(FactStoreError::SchemaIncompatible(format!(
                "column '{}' is NOT NULL in the store but is not written",
                have.name
            )));
        }
        retained_columns.push(have.name.clone());
    }

    Ok(SchemaPlan {
        create_table: false,
        add_columns,
        retained_columns,
        desired: desired.to_vec(),
    })
}

/// Result of comparing the store's schema with what the engine writes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaAudit {
    /// Conditions that would abort a batch.
    pub problems: Vec<String>,
    /// Changes the next batch would make, or columns it ignores.
    pub warnings: Vec<String>,
}

impl SchemaAudit {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Audit without touching the store.
pub fn audit_schema(existing: &[ColumnSpec], desired: &[ColumnSpec]) -> SchemaAudit {
    let mut audit = SchemaAudit::default();

    if existing.is_empty() {
        audit
            .warnings
            .push("target table does not exist and will be created".to_string());
        return audit;
    }

    for key in KEY_COLUMNS {
        if !existing.iter().any(|c| c.name == key) {
            audit
                .problems
                .push(format!("merge key column '{key}' is missing"));
        }
    }

    for want in desired {
        match existing.iter().find(|c| c.name == want.name) {
            Some(have) if have.kind != want.kind => audit.problems.push(format!(
                "column '{}' has type {}, expected {}",
                want.name, have.kind, want.kind
            )),
            Some(_) => {}
            None => audit
                .warnings
                .push(format!("column '{}' will be added as nullable {}", want.name, want.kind)),
        }
    }

    for have in existing {
        if desired.iter().any(|want| want.name == have.name) {
            continue;
        }
        if have.nullable {
            audit.warnings.push(format!(
                "column '{}' exists in the store but is not written",
                have.name
            ));
        } else {
            audit.problems.push(format!(
                "column '{}' is NOT NULL but is not written",
                have.name
            ));
        }
    }

    audit
}

/// Accepts only plain lower-case SQL identifiers so table names can be
/// interpolated into statements.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
