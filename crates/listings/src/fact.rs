//! Fact drafts (natural keys only) and assembled fact rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use listing_facts_core::{
    ChannelId, ListingFingerprint, ListingId, Money, ProductId, StockLocationId, StoreId,
    SurrogateKey, TaxonId, VariantId, VendorId,
};

use crate::aggregate::ProductAggregate;
use crate::classifier::{CurrentState, EventPair};
use crate::snapshot::CommittedState;
use crate::source::{CandidateListing, Listing, ProductOwner};

/// A classified listing whose dimension keys are still natural keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactDraft {
    pub listing: Listing,
    pub owner: Option<ProductOwner>,
    pub aggregate: ProductAggregate,
    pub taxon_id: Option<TaxonId>,
    pub event: EventPair,
}

impl FactDraft {
    pub fn new(
        candidate: CandidateListing,
        aggregate: ProductAggregate,
        taxon_id: Option<TaxonId>,
        event: EventPair,
    ) -> Self {
        Self {
            listing: candidate.listing,
            owner: candidate.owner,
            aggregate,
            taxon_id,
            event,
        }
    }

    pub fn listing_id(&self) -> ListingId {
        self.listing.listing_id
    }

    pub fn product_id(&self) -> ProductId {
        self.listing.product_id
    }

    pub fn variant_id(&self) -> Option<VariantId> {
        self.aggregate.variant_id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.owner.and_then(|o| o.store_id)
    }

    pub fn vendor_id(&self) -> Option<VendorId> {
        self.owner.and_then(|o| o.vendor_id)
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.listing.channel_id
    }

    pub fn stock_location_id(&self) -> Option<StockLocationId> {
        self.aggregate.stock_location_id()
    }

    /// Natural key of the creation-date dimension (`YYYY-MM-DD`).
    pub fn created_date_key(&self) -> String {
        self.listing.created_at.format("%Y-%m-%d").to_string()
    }

    pub fn current_state(&self) -> CurrentState {
        CurrentState {
            stock_quantity: self.aggregate.stock_quantity(),
            price_minor: self.aggregate.price().amount_minor,
            is_approved: self.listing.is_approved,
            is_published: self.listing.is_published,
        }
    }
}

/// Resolved surrogate keys for every dimension a fact row references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionKeys {
    pub product_key: SurrogateKey,
    pub variant_key: SurrogateKey,
    pub store_key: SurrogateKey,
    pub vendor_key: SurrogateKey,
    pub channel_key: SurrogateKey,
    pub created_date_key: SurrogateKey,
    pub stock_location_key: SurrogateKey,
    pub taxon_key: SurrogateKey,
    pub event_key: SurrogateKey,
}

impl DimensionKeys {
    pub fn unknown() -> Self {
        Self {
            product_key: SurrogateKey::unknown(),
            variant_key: SurrogateKey::unknown(),
            store_key: SurrogateKey::unknown(),
            vendor_key: SurrogateKey::unknown(),
            channel_key: SurrogateKey::unknown(),
            created_date_key: SurrogateKey::unknown(),
            stock_location_key: SurrogateKey::unknown(),
            taxon_key: SurrogateKey::unknown(),
            event_key: SurrogateKey::unknown(),
        }
    }
}

/// One emitted record of the listing event log.
///
/// Uniquely keyed by `(listing_id, updated_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRow {
    pub listing_id: ListingId,
    pub fingerprint: ListingFingerprint,
    pub keys: DimensionKeys,

    // Natural keys, kept for traceability.
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub store_id: Option<StoreId>,
    pub vendor_id: Option<VendorId>,
    pub channel_id: Option<ChannelId>,
    pub stock_location_id: Option<StockLocationId>,
    pub taxon_id: Option<TaxonId>,
    pub event: EventPair,

    pub stock_quantity: i64,
    pub price: Money,
    pub is_approved: bool,
    pub is_published: bool,
    pub is_active: bool,
    pub has_stock: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,

    // Write metadata.
    pub extracted_at: DateTime<Utc>,
    pub batch_id: Uuid,
}

impl FactRow {
    pub fn from_draft(
        draft: FactDraft,
        keys: DimensionKeys,
        extracted_at: DateTime<Utc>,
        batch_id: Uuid,
    ) -> Self {
        let stock_quantity = draft.aggregate.stock_quantity();
        let listing = &draft.listing;

        Self {
            listing_id: listing.listing_id,
            fingerprint: ListingFingerprint::of(listing.listing_id),
            keys,
            product_id: listing.product_id,
            variant_id: draft.variant_id(),
            store_id: draft.store_id(),
            vendor_id: draft.vendor_id(),
            channel_id: draft.channel_id(),
            stock_location_id: draft.stock_location_id(),
            taxon_id: draft.taxon_id,
            event: draft.event,
            stock_quantity,
            price: draft.aggregate.price(),
            is_approved: listing.is_approved,
            is_published: listing.is_published,
            is_active: listing.is_approved && listing.is_published,
            has_stock: stock_quantity > 0,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
            deleted_at: listing.deleted_at,
            extracted_at,
            batch_id,
        }
    }

    /// Merge key in the target store.
    pub fn merge_key(&self) -> (ListingId, DateTime<Utc>) {
        (self.listing_id, self.updated_at)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Comparison attributes as later read back by the previous-state resolver.
    pub fn committed_state(&self) -> CommittedState {
        CommittedState {
            fingerprint: self.fingerprint.clone(),
            stock_quantity: self.stock_quantity,
            price_minor: self.price.amount_minor,
            is_approved: self.is_approved,
            is_published: self.is_published,
            is_deleted: self.is_deleted(),
            updated_at: self.updated_at,
            extracted_at: self.extracted_at,
        }
    }
}

/// Derived "current state" view over the event log: per listing, the row with
/// the greatest `updated_at`.
pub fn current_state<'a, I>(rows: I) -> HashMap<ListingId, &'a FactRow>
where
    I: IntoIterator<Item = &'a FactRow>,
{
    let mut latest: HashMap<ListingId, &FactRow> = HashMap::new();
    for row in rows {
        match latest.get(&row.listing_id) {
            Some(existing) if existing.updated_at >= row.updated_at => {}
            _ => {
                latest.insert(row.listing_id, row);
            }
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::aggregate::StockAggregate;
    use crate::classifier::{EventAction, EventType};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn draft(listing: i64, updated: i64, stock: i64) -> FactDraft {
        let candidate = CandidateListing {
            listing: Listing {
                listing_id: ListingId::new(listing),
                product_id: ProductId::new(10),
                channel_id: Some(ChannelId::new(3)),
                is_approved: true,
                is_published: false,
                created_at: t(0),
                updated_at: t(updated),
                deleted_at: None,
            },
            owner: Some(ProductOwner {
                vendor_id: Some(VendorId::new(5)),
                store_id: None,
            }),
        };
        let aggregate = ProductAggregate {
            variant_id: Some(VariantId::new(100)),
            stock: Some(StockAggregate {
                quantity: stock,
                stock_location_id: Some(StockLocationId::new(9)),
            }),
            price: Some(Money::new(1999, "EUR")),
        };
        FactDraft::new(
            candidate,
            aggregate,
            Some(TaxonId::new(4)),
            EventPair::new(EventType::Stock, EventAction::UpdateInc),
        )
    }

    #[test]
    fn draft_exposes_natural_keys() {
        let d = draft(1, 0, 2);
        assert_eq!(d.vendor_id(), Some(VendorId::new(5)));
        assert_eq!(d.store_id(), None);
        assert_eq!(d.created_date_key(), "2024-03-01");
        assert_eq!(d.current_state().price_minor, 1999);
        assert!(!d.current_state().is_active());
    }

    #[test]
    fn row_derives_flags_and_metadata() {
        let batch = Uuid::now_v7();
        let row = FactRow::from_draft(draft(1, 5, 0), DimensionKeys::unknown(), t(100), batch);
        assert!(!row.is_active);
        assert!(!row.has_stock);
        assert_eq!(row.price.currency.as_deref(), Some("EUR"));
        assert_eq!(row.merge_key(), (ListingId::new(1), t(5)));
        assert_eq!(row.batch_id, batch);
        assert_eq!(row.fingerprint, ListingFingerprint::of(ListingId::new(1)));

        let state = row.committed_state();
        assert_eq!(state.extracted_at, t(100));
        assert!(!state.is_deleted);
    }

    #[test]
    fn current_state_view_keeps_latest_row_per_listing() {
        let rows: Vec<FactRow> = [(1, 5, 1), (1, 9, 2), (1, 7, 3), (2, 1, 4)]
            .into_iter()
            .map(|(l, u, s)| {
                FactRow::from_draft(draft(l, u, s), DimensionKeys::unknown(), t(100), Uuid::nil())
            })
            .collect();
        let view = current_state(&rows);
        assert_eq!(view.len(), 2);
        assert_eq!(view[&ListingId::new(1)].stock_quantity, 2);
        assert_eq!(view[&ListingId::new(2)].stock_quantity, 4);
    }
}
