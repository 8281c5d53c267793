//! Watermark selection.
//!
//! The watermark is read once at batch start (or injected by the caller) and
//! never re-read during the batch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Span, instrument};

use listing_facts_core::ProductId;
use listing_facts_listings::{CandidateListing, Listing, Product, ProductOwner};

use crate::fact_store::{FactStore, FactStoreError};
use crate::source::{SourceCatalog, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Watermark {
    /// Reprocess every listing.
    FullRebuild,
    /// Reprocess listings updated strictly after this instant.
    After(DateTime<Utc>),
}

impl Watermark {
    /// Watermark from the store's greatest committed `updated_at`.
    pub fn from_max(max_updated_at: Option<DateTime<Utc>>) -> Self {
        match max_updated_at {
            Some(at) => Watermark::After(at),
            None => Watermark::FullRebuild,
        }
    }

    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        match self {
            Watermark::FullRebuild => None,
            Watermark::After(at) => Some(*at),
        }
    }
}

impl core::fmt::Display for Watermark {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Watermark::FullRebuild => f.write_str("full-rebuild"),
            Watermark::After(at) => write!(f, "after {}", at.to_rfc3339()),
        }
    }
}

pub async fn read_watermark<F>(store: &F) -> Result<Watermark, FactStoreError>
where
    F: FactStore + ?Sized,
{
    Ok(Watermark::from_max(store.max_updated_at().await?))
}

/// Left-enrich listings with their product's owner.
///
/// Soft-deleted or missing products leave `owner` empty; the listing is kept.
pub fn enrich_candidates(listings: Vec<Listing>, products: &[Product]) -> Vec<CandidateListing> {
    let owners: HashMap<ProductId, ProductOwner> = products
        .iter()
        .filter(|p| !p.is_deleted())
        .map(|p| {
            (
                p.product_id,
                ProductOwner {
                    vendor_id: p.vendor_id,
                    store_id: p.store_id,
                },
            )
        })
        .collect();

    listings
        .into_iter()
        .map(|listing| {
            let owner = owners.get(&listing.product_id).copied();
            CandidateListing { listing, owner }
        })
        .collect()
}

/// Listings needing reprocessing under `watermark`.
#[instrument(skip(source, watermark), fields(watermark = %watermark, candidate_count), err)]
pub async fn select_candidates<S>(
    source: &S,
    watermark: Watermark,
) -> Result<Vec<CandidateListing>, SourceError>
where
    S: SourceCatalog + ?Sized,
{
    let listings = source.listings_updated_after(watermark.lower_bound()).await?;
    if listings.is_empty() {
        Span::current().record("candidate_count", 0);
        return Ok(vec![]);
    }

    let mut product_ids: Vec<ProductId> = listings.iter().map(|l| l.product_id).collect();
    product_ids.sort();
    product_ids.dedup();

    let products = source.products(&product_ids).await?;
    let candidates = enrich_candidates(listings, &products);

    Span::current().record("candidate_count", candidates.len());
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySourceCatalog;
    use crate::test_support::{listing, ts};
    use listing_facts_core::{StoreId, VendorId};

    fn product(id: i64, vendor: i64, store: i64, deleted: bool) -> Product {
        Product {
            product_id: ProductId::new(id),
            vendor_id: Some(VendorId::new(vendor)),
            store_id: Some(StoreId::new(store)),
            deleted_at: deleted.then(|| ts(0)),
        }
    }

    #[test]
    fn watermark_from_absent_max_is_full_rebuild() {
        assert_eq!(Watermark::from_max(None), Watermark::FullRebuild);
        assert_eq!(Watermark::from_max(Some(ts(5))), Watermark::After(ts(5)));
        assert_eq!(Watermark::After(ts(5)).lower_bound(), Some(ts(5)));
    }

    #[test]
    fn deleted_products_do_not_enrich() {
        let listings = vec![listing(1, 10, 1), listing(2, 20, 1), listing(3, 30, 1)];
        let products = vec![product(10, 1, 2, false), product(20, 3, 4, true)];

        let candidates = enrich_candidates(listings, &products);
        assert_eq!(candidates.len(), 3);
        assert_eq!(
            candidates[0].owner.and_then(|o| o.vendor_id),
            Some(VendorId::new(1))
        );
        assert!(candidates[1].owner.is_none());
        assert!(candidates[2].owner.is_none());
    }

    #[tokio::test]
    async fn selects_strictly_after_watermark() {
        let source = InMemorySourceCatalog::new();
        source.upsert_listing(listing(1, 10, 5));
        source.upsert_listing(listing(2, 10, 10));
        source.upsert_listing(listing(3, 10, 15));

        let after = select_candidates(&source, Watermark::After(ts(10))).await.unwrap();
        let ids: Vec<i64> = after.iter().map(|c| c.listing_id().value()).collect();
        assert_eq!(ids, vec![3]);

        let all = select_candidates(&source, Watermark::FullRebuild).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn empty_selection_is_valid() {
        let source = InMemorySourceCatalog::new();
        let none = select_candidates(&source, Watermark::FullRebuild).await.unwrap();
        assert!(none.is_empty());
    }
}
