//! Upstream source collaborators (read-only).
//!
//! The engine never writes to sources; it only reads cleaned source tables
//! scoped to the listings and products of the current batch.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemorySourceCatalog;
pub use postgres::PostgresSourceCatalog;
pub use r#trait::{SourceCatalog, SourceError};
