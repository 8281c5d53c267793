use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use listing_facts_core::{ListingId, ProductId, TaxonId};
use listing_facts_listings::{
    Listing, ListingTaxon, PriceRecord, Product, StockItem, Taxon, Variant,
};

/// Source collaborator failure.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The collaborator could not be reached or timed out (transient).
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The collaborator returned rows that cannot be interpreted.
    #[error("malformed source row: {0}")]
    Malformed(String),
}

/// Read-only access to the cleaned source tables.
///
/// Implementations return records regardless of soft deletion; aggregation
/// decides what to exclude. Stock items and prices are returned in ascending
/// identity order so "first encountered" selections are reproducible.
#[async_trait::async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Listings whose `updated_at` is strictly greater than `after`, or all
    /// listings when `after` is `None`.
    async fn listings_updated_after(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Listing>, SourceError>;

    async fn products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, SourceError>;

    /// All variants of the given products.
    async fn variants(&self, product_ids: &[ProductId]) -> Result<Vec<Variant>, SourceError>;

    /// Stock items attached to any variant of the given products.
    async fn stock_items(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, SourceError>;

    /// Price records attached to any variant of the given products.
    async fn prices(&self, product_ids: &[ProductId]) -> Result<Vec<PriceRecord>, SourceError>;

    async fn listing_taxons(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ListingTaxon>, SourceError>;

    async fn taxons(&self, taxon_ids: &[TaxonId]) -> Result<Vec<Taxon>, SourceError>;
}

#[async_trait::async_trait]
impl<S> SourceCatalog for Arc<S>
where
    S: SourceCatalog + ?Sized,
{
    async fn listings_updated_after(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Listing>, SourceError> {
        (**self).listings_updated_after(after).await
    }

    async fn products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, SourceError> {
        (**self).products(product_ids).await
    }

    async fn variants(&self, product_ids: &[ProductId]) -> Result<Vec<Variant>, SourceError> {
        (**self).variants(product_ids).await
    }

    async fn stock_items(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, SourceError> {
        (**self).stock_items(product_ids).await
    }

    async fn prices(&self, product_ids: &[ProductId]) -> Result<Vec<PriceRecord>, SourceError> {
        (**self).prices(product_ids).await
    }

    async fn listing_taxons(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ListingTaxon>, SourceError> {
        (**self).listing_taxons(listing_ids).await
    }

    async fn taxons(&self, taxon_ids: &[TaxonId]) -> Result<Vec<Taxon>, SourceError> {
        (**self).taxons(taxon_ids).await
    }
}
