use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use listing_facts_core::SurrogateKey;

use super::taxonomy::EventTaxonomy;

/// Keyed reference dimensions a fact row points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Product,
    Variant,
    Store,
    Vendor,
    Channel,
    Date,
    StockLocation,
    Taxon,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Product,
        Dimension::Variant,
        Dimension::Store,
        Dimension::Vendor,
        Dimension::Channel,
        Dimension::Date,
        Dimension::StockLocation,
        Dimension::Taxon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Product => "product",
            Dimension::Variant => "variant",
            Dimension::Store => "store",
            Dimension::Vendor => "vendor",
            Dimension::Channel => "channel",
            Dimension::Date => "date",
            Dimension::StockLocation => "stock_location",
            Dimension::Taxon => "taxon",
        }
    }

    /// Backing table in the Postgres adapter.
    pub fn table(&self) -> &'static str {
        match self {
            Dimension::Product => "dim_product",
            Dimension::Variant => "dim_variant",
            Dimension::Store => "dim_store",
            Dimension::Vendor => "dim_vendor",
            Dimension::Channel => "dim_channel",
            Dimension::Date => "dim_date",
            Dimension::StockLocation => "dim_stock_location",
            Dimension::Taxon => "dim_taxon",
        }
    }
}

impl core::fmt::Display for Dimension {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum DimensionError {
    /// The collaborator could not be reached (transient).
    #[error("dimension source unavailable: {0}")]
    Unavailable(String),

    /// A dimension table is missing or has the wrong shape.
    #[error("dimension source misconfigured: {0}")]
    Misconfigured(String),
}

impl DimensionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DimensionError::Unavailable(_))
    }
}

/// Natural-key → surrogate-key lookups, one keyed collaborator per dimension.
#[async_trait::async_trait]
pub trait DimensionSource: Send + Sync {
    /// Surrogate keys for the natural keys that exist; absent keys are simply
    /// missing from the map.
    async fn lookup_many(
        &self,
        dimension: Dimension,
        natural_keys: &[String],
    ) -> Result<HashMap<String, SurrogateKey>, DimensionError>;

    /// The pre-populated `(event_type, event_action)` collaborator.
    async fn event_taxonomy(&self) -> Result<EventTaxonomy, DimensionError>;
}

#[async_trait::async_trait]
impl<S> DimensionSource for Arc<S>
where
    S: DimensionSource + ?Sized,
{
    async fn lookup_many(
        &self,
        dimension: Dimension,
        natural_keys: &[String],
    ) -> Result<HashMap<String, SurrogateKey>, DimensionError> {
        (**self).lookup_many(dimension, natural_keys).await
    }

    async fn event_taxonomy(&self) -> Result<EventTaxonomy, DimensionError> {
        (**self).event_taxonomy().await
    }
}
