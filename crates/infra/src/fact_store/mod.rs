//! Append-only fact store boundary.
//!
//! The target store is an event log of listing states keyed by
//! `(listing_id, updated_at)`. It is also the engine's memory: the watermark
//! and previous states are read back from it.

pub mod in_memory;
pub mod postgres;
pub mod schema;
pub mod r#trait;

pub use in_memory::InMemoryFactStore;
pub use postgres::PostgresFactStore;
pub use schema::{
    ColumnKind, ColumnSpec, SchemaAudit, SchemaPlan, audit_schema, fact_columns, reconcile,
};
pub use r#trait::{FactStore, FactStoreError, MergeOutcome, validate_rows};
