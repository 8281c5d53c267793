//! Source loading and aggregation for one batch.
//!
//! The four source reads are independent and run concurrently; the pure
//! aggregators then collapse them per product and per listing.

use std::collections::{HashMap, HashSet};

use tracing::{Span, instrument};

use listing_facts_core::{ListingId, ProductId, TaxonId};
use listing_facts_listings::{
    CandidateListing, ProductAggregate, aggregate_prices, aggregate_products, aggregate_stock,
    aggregate_taxons, aggregate_variants,
};

use crate::source::{SourceCatalog, SourceError};

/// Aggregates for every candidate of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchAggregates {
    pub products: HashMap<ProductId, ProductAggregate>,
    pub taxons: HashMap<ListingId, TaxonId>,
}

impl BatchAggregates {
    /// Aggregate for `product_id`, defaulted when nothing was found.
    pub fn product(&self, product_id: ProductId) -> ProductAggregate {
        self.products.get(&product_id).cloned().unwrap_or_default()
    }

    pub fn primary_taxon(&self, listing_id: ListingId) -> Option<TaxonId> {
        self.taxons.get(&listing_id).copied()
    }
}

#[instrument(
    skip(source, candidates),
    fields(candidate_count = candidates.len(), product_count, taxon_count),
    err
)]
pub async fn load_aggregates<S>(
    source: &S,
    candidates: &[CandidateListing],
) -> Result<BatchAggregates, SourceError>
where
    S: SourceCatalog + ?Sized,
{
    let product_scope: HashSet<ProductId> = candidates.iter().map(|c| c.product_id()).collect();
    let listing_scope: HashSet<ListingId> = candidates.iter().map(|c| c.listing_id()).collect();

    let mut product_ids: Vec<ProductId> = product_scope.iter().copied().collect();
    product_ids.sort();
    let mut listing_ids: Vec<ListingId> = listing_scope.iter().copied().collect();
    listing_ids.sort();

    let (variants, stock_items, prices, listing_taxons) = tokio::try_join!(
        source.variants(&product_ids),
        source.stock_items(&product_ids),
        source.prices(&product_ids),
        source.listing_taxons(&listing_ids),
    )?;

    let mut taxon_ids: Vec<TaxonId> = listing_taxons.iter().map(|lt| lt.taxon_id).collect();
    taxon_ids.sort();
    taxon_ids.dedup();
    let taxons = if taxon_ids.is_empty() {
        vec![]
    } else {
        source.taxons(&taxon_ids).await?
    };

    let products = aggregate_products(
        &product_scope,
        aggregate_variants(&product_scope, &variants),
        aggregate_stock(&product_scope, &variants, &stock_items),
        aggregate_prices(&product_scope, &variants, &prices),
    );
    let taxons = aggregate_taxons(&listing_scope, &listing_taxons, &taxons);

    let span = Span::current();
    span.record("product_count", products.len());
    span.record("taxon_count", taxons.len());

    Ok(BatchAggregates { products, taxons })
}
