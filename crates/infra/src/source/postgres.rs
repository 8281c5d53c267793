//! Postgres-backed source catalog.
//!
//! Reads the cleaned source tables (`listings`, `products`, `variants`,
//! `stock_items`, `prices`, `listing_taxons`, `taxons`). Id filters are passed
//! as `BIGINT[]` and matched with `= ANY($1)`. Stock items and prices are
//! ordered by identity so downstream tie-breaks are reproducible.
//!
//! ## Error Mapping
//!
//! | SQLx Error | SourceError |
//! |------------|-------------|
//! | PoolTimedOut / PoolClosed / Io / Tls | `Unavailable` |
//! | Database (any code) | `Unavailable` |
//! | ColumnDecode / Decode / ColumnNotFound | `Malformed` |

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{Span, instrument};

use listing_facts_core::{
    ChannelId, ListingId, ProductId, StockLocationId, StoreId, TaxonId, VariantId, VendorId,
};
use listing_facts_listings::{
    Listing, ListingTaxon, PriceRecord, Product, StockItem, Taxon, Variant,
};

use super::r#trait::{SourceCatalog, SourceError};

#[derive(Debug, Clone)]
pub struct PostgresSourceCatalog {
    pool: Arc<PgPool>,
}

impl PostgresSourceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn raw_ids<T: Copy + Into<i64>>(ids: &[T]) -> Vec<i64> {
    ids.iter().map(|id| (*id).into()).collect()
}

#[async_trait::async_trait]
impl SourceCatalog for PostgresSourceCatalog {
    #[instrument(skip(self, after), fields(after = ?after, listing_count), err)]
    async fn listings_updated_after(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Listing>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                product_id,
                channel_id,
                is_approved,
                is_published,
                created_at,
                updated_at,
                deleted_at
            FROM listings
            WHERE $1::timestamptz IS NULL OR updated_at > $1
            ORDER BY id ASC
            "#,
        )
        .bind(after)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("listings_updated_after", e))?;

        let listings = rows
            .iter()
            .map(listing_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_listing", e))?;

        Span::current().record("listing_count", listings.len());
        Ok(listings)
    }

    #[instrument(skip(self, product_ids), fields(product_count = product_ids.len()), err)]
    async fn products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_id, store_id, deleted_at
            FROM products
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(raw_ids(product_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("products", e))?;

        rows.iter()
            .map(|row| {
                Ok(Product {
                    product_id: ProductId::new(row.try_get("id")?),
                    vendor_id: row.try_get::<Option<i64>, _>("vendor_id")?.map(VendorId::new),
                    store_id: row.try_get::<Option<i64>, _>("store_id")?.map(StoreId::new),
                    deleted_at: row.try_get("deleted_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_product", e))
    }

    #[instrument(skip(self, product_ids), fields(product_count = product_ids.len()), err)]
    async fn variants(&self, product_ids: &[ProductId]) -> Result<Vec<Variant>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, deleted_at
            FROM variants
            WHERE product_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(raw_ids(product_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("variants", e))?;

        rows.iter()
            .map(|row| {
                Ok(Variant {
                    variant_id: VariantId::new(row.try_get("id")?),
                    product_id: ProductId::new(row.try_get("product_id")?),
                    deleted_at: row.try_get("deleted_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_variant", e))
    }

    #[instrument(skip(self, product_ids), fields(product_count = product_ids.len()), err)]
    async fn stock_items(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.variant_id, s.stock_location_id, s.count_on_hand, s.deleted_at
            FROM stock_items s
            JOIN variants v ON v.id = s.variant_id
            WHERE v.product_id = ANY($1)
            ORDER BY s.id ASC
            "#,
        )
        .bind(raw_ids(product_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_items", e))?;

        rows.iter()
            .map(|row| {
                Ok(StockItem {
                    stock_item_id: row.try_get("id")?,
                    variant_id: VariantId::new(row.try_get("variant_id")?),
                    stock_location_id: row
                        .try_get::<Option<i64>, _>("stock_location_id")?
                        .map(StockLocationId::new),
                    count_on_hand: row.try_get("count_on_hand")?,
                    deleted_at: row.try_get("deleted_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_stock_item", e))
    }

    #[instrument(skip(self, product_ids), fields(product_count = product_ids.len()), err)]
    async fn prices(&self, product_ids: &[ProductId]) -> Result<Vec<PriceRecord>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.variant_id, p.amount_minor, p.currency, p.deleted_at
            FROM prices p
            JOIN variants v ON v.id = p.variant_id
            WHERE v.product_id = ANY($1)
            ORDER BY p.id ASC
            "#,
        )
        .bind(raw_ids(product_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("prices", e))?;

        rows.iter()
            .map(|row| {
                Ok(PriceRecord {
                    price_id: row.try_get("id")?,
                    variant_id: VariantId::new(row.try_get("variant_id")?),
                    amount_minor: row.try_get("amount_minor")?,
                    currency: row.try_get("currency")?,
                    deleted_at: row.try_get("deleted_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_price", e))
    }

    #[instrument(skip(self, listing_ids), fields(listing_count = listing_ids.len()), err)]
    async fn listing_taxons(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ListingTaxon>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT listing_id, taxon_id
            FROM listing_taxons
            WHERE listing_id = ANY($1)
            ORDER BY listing_id ASC, taxon_id ASC
            "#,
        )
        .bind(raw_ids(listing_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("listing_taxons", e))?;

        rows.iter()
            .map(|row| {
                Ok(ListingTaxon {
                    listing_id: ListingId::new(row.try_get("listing_id")?),
                    taxon_id: TaxonId::new(row.try_get("taxon_id")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_listing_taxon", e))
    }

    #[instrument(skip(self, taxon_ids), fields(taxon_count = taxon_ids.len()), err)]
    async fn taxons(&self, taxon_ids: &[TaxonId]) -> Result<Vec<Taxon>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_id
            FROM taxons
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(raw_ids(taxon_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("taxons", e))?;

        rows.iter()
            .map(|row| {
                Ok(Taxon {
                    taxon_id: TaxonId::new(row.try_get("id")?),
                    parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(TaxonId::new),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_taxon", e))
    }
}

fn listing_from_row(row: &PgRow) -> Result<Listing, sqlx::Error> {
    Ok(Listing {
        listing_id: ListingId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        channel_id: row.try_get::<Option<i64>, _>("channel_id")?.map(ChannelId::new),
        is_approved: row.try_get("is_approved")?,
        is_published: row.try_get("is_published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SourceError {
    match err {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => {
            SourceError::Malformed(format!("{operation}: {err}"))
        }
        sqlx::Error::Database(db_err) => SourceError::Unavailable(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        _ => SourceError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
