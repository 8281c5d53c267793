use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use listing_facts_core::{ListingId, ProductId, TaxonId, VariantId};
use listing_facts_listings::{
    Listing, ListingTaxon, PriceRecord, Product, StockItem, Taxon, Variant,
};

use super::r#trait::{SourceCatalog, SourceError};

#[derive(Debug, Default)]
struct Tables {
    listings: BTreeMap<ListingId, Listing>,
    products: BTreeMap<ProductId, Product>,
    variants: BTreeMap<VariantId, Variant>,
    stock_items: BTreeMap<i64, StockItem>,
    prices: BTreeMap<i64, PriceRecord>,
    listing_taxons: Vec<ListingTaxon>,
    taxons: BTreeMap<TaxonId, Taxon>,
}

/// In-memory source tables for tests/dev.
///
/// Upserts replace rows by identity, mirroring how the cleaned source tables
/// only ever hold the latest version of a record.
#[derive(Debug, Default)]
pub struct InMemorySourceCatalog {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemorySourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail with `SourceError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn upsert_listing(&self, listing: Listing) {
        if let Ok(mut t) = self.tables.write() {
            t.listings.insert(listing.listing_id, listing);
        }
    }

    pub fn upsert_product(&self, product: Product) {
        if let Ok(mut t) = self.tables.write() {
            t.products.insert(product.product_id, product);
        }
    }

    pub fn upsert_variant(&self, variant: Variant) {
        if let Ok(mut t) = self.tables.write() {
            t.variants.insert(variant.variant_id, variant);
        }
    }

    pub fn upsert_stock_item(&self, item: StockItem) {
        if let Ok(mut t) = self.tables.write() {
            t.stock_items.insert(item.stock_item_id, item);
        }
    }

    pub fn upsert_price(&self, price: PriceRecord) {
        if let Ok(mut t) = self.tables.write() {
            t.prices.insert(price.price_id, price);
        }
    }

    pub fn add_listing_taxon(&self, link: ListingTaxon) {
        if let Ok(mut t) = self.tables.write() {
            if !t.listing_taxons.contains(&link) {
                t.listing_taxons.push(link);
            }
        }
    }

    pub fn upsert_taxon(&self, taxon: Taxon) {
        if let Ok(mut t) = self.tables.write() {
            t.taxons.insert(taxon.taxon_id, taxon);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("in-memory source marked unavailable".to_string()));
        }
        self.tables
            .read()
            .map_err(|_| SourceError::Unavailable("lock poisoned".to_string()))
    }

    fn variant_ids_of(tables: &Tables, product_ids: &[ProductId]) -> HashSet<VariantId> {
        let scope: HashSet<&ProductId> = product_ids.iter().collect();
        tables
            .variants
            .values()
            .filter(|v| scope.contains(&v.product_id))
            .map(|v| v.variant_id)
            .collect()
    }
}

#[async_trait::async_trait]
impl SourceCatalog for InMemorySourceCatalog {
    async fn listings_updated_after(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Listing>, SourceError> {
        let t = self.read()?;
        Ok(t.listings
            .values()
            .filter(|l| after.is_none_or(|w| l.updated_at > w))
            .cloned()
            .collect())
    }

    async fn products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, SourceError> {
        let t = self.read()?;
        Ok(product_ids
            .iter()
            .filter_map(|id| t.products.get(id).cloned())
            .collect())
    }

    async fn variants(&self, product_ids: &[ProductId]) -> Result<Vec<Variant>, SourceError> {
        let t = self.read()?;
        let scope: HashSet<&ProductId> = product_ids.iter().collect();
        Ok(t.variants
            .values()
            .filter(|v| scope.contains(&v.product_id))
            .cloned()
            .collect())
    }

    async fn stock_items(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, SourceError> {
        let t = self.read()?;
        let variant_ids = Self::variant_ids_of(&t, product_ids);
        Ok(t.stock_items
            .values()
            .filter(|s| variant_ids.contains(&s.variant_id))
            .cloned()
            .collect())
    }

    async fn prices(&self, product_ids: &[ProductId]) -> Result<Vec<PriceRecord>, SourceError> {
        let t = self.read()?;
        let variant_ids = Self::variant_ids_of(&t, product_ids);
        Ok(t.prices
            .values()
            .filter(|p| variant_ids.contains(&p.variant_id))
            .cloned()
            .collect())
    }

    async fn listing_taxons(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ListingTaxon>, SourceError> {
        let t = self.read()?;
        let scope: HashSet<&ListingId> = listing_ids.iter().collect();
        Ok(t.listing_taxons
            .iter()
            .filter(|lt| scope.contains(&lt.listing_id))
            .cloned()
            .collect())
    }

    async fn taxons(&self, taxon_ids: &[TaxonId]) -> Result<Vec<Taxon>, SourceError> {
        let t = self.read()?;
        Ok(taxon_ids
            .iter()
            .filter_map(|id| t.taxons.get(id).cloned())
            .collect())
    }
}
