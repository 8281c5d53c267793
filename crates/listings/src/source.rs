//! Source records as read from the upstream collaborators.
//!
//! These mirror the cleaned source tables one-to-one. Soft deletion is carried
//! as `deleted_at`; aggregation excludes any record where it is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use listing_facts_core::{
    ChannelId, ListingId, ProductId, StockLocationId, StoreId, TaxonId, VariantId, VendorId,
};

/// A product offered for sale through a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: ListingId,
    pub product_id: ProductId,
    pub channel_id: Option<ChannelId>,
    pub is_approved: bool,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub vendor_id: Option<VendorId>,
    pub store_id: Option<StoreId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Variant {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// On-hand stock of one variant at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub stock_item_id: i64,
    pub variant_id: VariantId,
    pub stock_location_id: Option<StockLocationId>,
    pub count_on_hand: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub price_id: i64,
    pub variant_id: VariantId,
    /// Amount in the smallest currency unit; `None` when the source left it blank.
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Listing ↔ taxon association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingTaxon {
    pub listing_id: ListingId,
    pub taxon_id: TaxonId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub taxon_id: TaxonId,
    pub parent_id: Option<TaxonId>,
}

/// Vendor/store ownership of a listing's product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOwner {
    pub vendor_id: Option<VendorId>,
    pub store_id: Option<StoreId>,
}

/// A listing selected for reprocessing, left-enriched with its product's owner.
///
/// `owner` is `None` when the product is missing or soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateListing {
    pub listing: Listing,
    pub owner: Option<ProductOwner>,
}

impl CandidateListing {
    pub fn listing_id(&self) -> ListingId {
        self.listing.listing_id
    }

    pub fn product_id(&self) -> ProductId {
        self.listing.product_id
    }
}
