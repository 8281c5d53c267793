//! Dimension boundary: natural keys in, surrogate keys out.

pub mod in_memory;
pub mod postgres;
pub mod resolver;
pub mod taxonomy;
pub mod r#trait;

pub use in_memory::InMemoryDimensions;
pub use postgres::PostgresDimensions;
pub use resolver::{DataQualityWarning, DimensionResolver, Resolution, WarningKind};
pub use taxonomy::EventTaxonomy;
pub use r#trait::{Dimension, DimensionError, DimensionSource};
