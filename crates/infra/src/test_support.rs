//! Fixture builders shared by the crate's tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use listing_facts_core::{ListingId, ProductId, StoreId, VariantId, VendorId};
use listing_facts_listings::{
    CandidateListing, EventAction, EventPair, EventType, FactDraft, Listing, ProductAggregate,
    ProductOwner,
};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

pub fn listing(id: i64, product: i64, updated_secs: i64) -> Listing {
    Listing {
        listing_id: ListingId::new(id),
        product_id: ProductId::new(product),
        channel_id: None,
        is_approved: false,
        is_published: false,
        created_at: ts(0),
        updated_at: ts(updated_secs),
        deleted_at: None,
    }
}

/// Candidate with `owner = (vendor, store)`; updated at `id` seconds.
pub fn candidate(id: i64, product: i64, owner: Option<(i64, i64)>) -> CandidateListing {
    CandidateListing {
        listing: listing(id, product, id),
        owner: owner.map(|(vendor, store)| ProductOwner {
            vendor_id: Some(VendorId::new(vendor)),
            store_id: Some(StoreId::new(store)),
        }),
    }
}

/// Draft whose representative variant is `product * 7`.
pub fn draft_for(candidate: CandidateListing, taxon: Option<i64>) -> FactDraft {
    let aggregate = ProductAggregate {
        variant_id: Some(VariantId::new(candidate.product_id().value() * 7)),
        stock: None,
        price: None,
    };
    FactDraft::new(
        candidate,
        aggregate,
        taxon.map(listing_facts_core::TaxonId::new),
        EventPair::new(EventType::Listing, EventAction::Create),
    )
}
