//! Dimension resolution with the `UNKNOWN` fallback.
//!
//! Every natural key a draft references is looked up in its dimension. A key
//! that is missing or has no match resolves to `UNKNOWN` and produces a
//! `DataQualityWarning`; resolution never drops a row.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use listing_facts_core::{ListingId, SurrogateKey};
use listing_facts_listings::{DimensionKeys, EventPair, FactDraft};

use super::r#trait::{Dimension, DimensionError, DimensionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The draft carries no natural key for the dimension.
    MissingNaturalKey,
    /// The natural key has no row in the dimension.
    UnmatchedNaturalKey,
    /// The event pair is absent from the event taxonomy.
    UnknownEventPair,
}

/// A non-fatal data-quality finding: the row is still emitted with `UNKNOWN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub listing_id: ListingId,
    /// Dimension name, or `event` for the event taxonomy.
    pub dimension: String,
    pub natural_key: Option<String>,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One entry per input draft, in input order.
    pub keys: Vec<DimensionKeys>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Natural key of `draft` in `dimension`, if it has one.
fn natural_key(draft: &FactDraft, dimension: Dimension) -> Option<String> {
    match dimension {
        Dimension::Product => Some(draft.product_id().natural_key()),
        Dimension::Variant => draft.variant_id().map(|id| id.natural_key()),
        Dimension::Store => draft.store_id().map(|id| id.natural_key()),
        Dimension::Vendor => draft.vendor_id().map(|id| id.natural_key()),
        Dimension::Channel => draft.channel_id().map(|id| id.natural_key()),
        Dimension::Date => Some(draft.created_date_key()),
        Dimension::StockLocation => draft.stock_location_id().map(|id| id.natural_key()),
        Dimension::Taxon => draft.taxon_id.map(|id| id.natural_key()),
    }
}

pub struct DimensionResolver<D> {
    source: D,
}

impl<D> DimensionResolver<D>
where
    D: DimensionSource,
{
    pub fn new(source: D) -> Self {
        Self { source }
    }

    /// Resolve surrogate keys for every draft.
    ///
    /// Fails only when the dimension collaborator itself fails.
    #[instrument(skip(self, drafts), fields(draft_count = drafts.len()), err)]
    pub async fn resolve(&self, drafts: &[FactDraft]) -> Result<Resolution, DimensionError> {
        let mut lookups: HashMap<Dimension, HashMap<String, SurrogateKey>> = HashMap::new();
        for dimension in Dimension::ALL {
            let wanted: BTreeSet<String> = drafts
                .iter()
                .filter_map(|d| natural_key(d, dimension))
                .collect();
            let wanted: Vec<String> = wanted.into_iter().collect();
            let found = self.source.lookup_many(dimension, &wanted).await?;
            lookups.insert(dimension, found);
        }
        let taxonomy = self.source.event_taxonomy().await?;
        let missing_pairs = taxonomy.missing_pairs();
        if !missing_pairs.is_empty() {
            let pairs: Vec<String> = missing_pairs.iter().map(ToString::to_string).collect();
            warn!(
                missing = pairs.len(),
                pairs = ?pairs,
                "event taxonomy does not cover every declared pair"
            );
        }

        let mut resolution = Resolution {
            keys: Vec::with_capacity(drafts.len()),
            warnings: Vec::new(),
        };

        for draft in drafts {
            let mut key_for = |dimension: Dimension| -> SurrogateKey {
                let natural = natural_key(draft, dimension);
                let found = natural
                    .as_ref()
                    .and_then(|nk| lookups.get(&dimension).and_then(|m| m.get(nk)));
                match (found, natural) {
                    (Some(key), _) => key.clone(),
                    (None, Some(nk)) => {
                        warn!(
                            listing_id = %draft.listing_id(),
                            dimension = %dimension,
                            natural_key = %nk,
                            "unmatched natural key, using UNKNOWN"
                        );
                        resolution.warnings.push(DataQualityWarning {
                            listing_id: draft.listing_id(),
                            dimension: dimension.as_str().to_string(),
                            natural_key: Some(nk),
                            kind: WarningKind::UnmatchedNaturalKey,
                        });
                        SurrogateKey::unknown()
                    }
                    (None, None) => {
                        debug!(
                            listing_id = %draft.listing_id(),
                            dimension = %dimension,
                            "no natural key, using UNKNOWN"
                        );
                        resolution.warnings.push(DataQualityWarning {
                            listing_id: draft.listing_id(),
                            dimension: dimension.as_str().to_string(),
                            natural_key: None,
                            kind: WarningKind::MissingNaturalKey,
                        });
                        SurrogateKey::unknown()
                    }
                }
            };

            let product_key = key_for(Dimension::Product);
            let variant_key = key_for(Dimension::Variant);
            let store_key = key_for(Dimension::Store);
            let vendor_key = key_for(Dimension::Vendor);
            let channel_key = key_for(Dimension::Channel);
            let created_date_key = key_for(Dimension::Date);
            let stock_location_key = key_for(Dimension::StockLocation);
            let taxon_key = key_for(Dimension::Taxon);

            let event_key = match taxonomy.lookup(&draft.event) {
                Some(key) => key.clone(),
                None => {
                    resolution.warnings.push(unknown_event(draft.listing_id(), draft.event));
                    SurrogateKey::unknown()
                }
            };

            resolution.keys.push(DimensionKeys {
                product_key,
                variant_key,
                store_key,
                vendor_key,
                channel_key,
                created_date_key,
                stock_location_key,
                taxon_key,
                event_key,
            });
        }

        Ok(resolution)
    }
}

fn unknown_event(listing_id: ListingId, pair: EventPair) -> DataQualityWarning {
    warn!(
        listing_id = %listing_id,
        event = %pair,
        "event pair missing from event taxonomy, using UNKNOWN"
    );
    DataQualityWarning {
        listing_id,
        dimension: "event".to_string(),
        natural_key: Some(pair.to_string()),
        kind: WarningKind::UnknownEventPair,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{EventTaxonomy, InMemoryDimensions};
    use crate::test_support::{candidate, draft_for};
    use listing_facts_core::{ListingId, SurrogateKey};
    use listing_facts_listings::{EventAction, EventType};
    use std::sync::Arc;

    #[tokio::test]
    async fn matched_keys_are_resolved() {
        let dims = Arc::new(InMemoryDimensions::new());
        let draft = draft_for(candidate(1, 10, Some((100, 200))), Some(7));

        let product = dims.register(Dimension::Product, "10");
        let store = dims.register(Dimension::Store, "200");
        let vendor = dims.register(Dimension::Vendor, "100");
        let variant = dims.register(Dimension::Variant, "70");

        let resolution = DimensionResolver::new(dims.clone()).resolve(&[draft]).await.unwrap();
        let keys = &resolution.keys[0];
        assert_eq!(keys.product_key, product);
        assert_eq!(keys.store_key, store);
        assert_eq!(keys.vendor_key, vendor);
        assert_eq!(keys.variant_key, variant);
        assert!(!keys.event_key.is_unknown());
    }

    #[tokio::test]
    async fn unmatched_keys_fall_back_to_unknown_with_warnings() {
        let dims = InMemoryDimensions::new();
        let draft = draft_for(candidate(1, 10, Some((100, 200))), None);

        let resolution = DimensionResolver::new(dims).resolve(&[draft]).await.unwrap();
        let keys = &resolution.keys[0];

        assert!(keys.product_key.is_unknown());
        assert!(keys.store_key.is_unknown());
        assert!(keys.taxon_key.is_unknown());
        assert!(resolution.warnings.iter().any(|w| w.dimension == "product"
            && w.kind == WarningKind::UnmatchedNaturalKey
            && w.natural_key.as_deref() == Some("10")));
        assert!(resolution.warnings.iter().any(|w| w.dimension == "taxon"
            && w.kind == WarningKind::MissingNaturalKey));
    }

    #[tokio::test]
    async fn missing_event_pair_is_a_warning_not_an_error() {
        let dims = InMemoryDimensions::new();
        dims.set_event_taxonomy(EventTaxonomy::from_entries(vec![(
            EventPair::new(EventType::Order, EventAction::Create),
            SurrogateKey::new("order-create"),
        )]));
        let draft = draft_for(candidate(3, 30, None), None);

        let resolution = DimensionResolver::new(dims).resolve(&[draft]).await.unwrap();
        assert!(resolution.keys[0].event_key.is_unknown());
        let event_warnings: Vec<_> = resolution
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::UnknownEventPair)
            .collect();
        assert_eq!(event_warnings.len(), 1);
        assert_eq!(event_warnings[0].listing_id, ListingId::new(3));
    }

    #[tokio::test]
    async fn partial_taxonomy_still_resolves_covered_pairs() {
        let dims = InMemoryDimensions::new();
        let removed = EventPair::new(EventType::Order, EventAction::Delete);
        let standard = EventTaxonomy::standard();
        let partial = EventTaxonomy::from_entries(
            EventPair::declared()
                .into_iter()
                .filter(|p| *p != removed)
                .filter_map(|p| standard.lookup(&p).cloned().map(|k| (p, k))),
        );
        assert_eq!(partial.missing_pairs(), vec![removed]);
        dims.set_event_taxonomy(partial);
        let draft = draft_for(candidate(4, 40, None), None);

        let resolution = DimensionResolver::new(dims).resolve(&[draft]).await.unwrap();
        assert!(!resolution.keys[0].event_key.is_unknown());
        assert!(resolution
            .warnings
            .iter()
            .all(|w| w.kind != WarningKind::UnknownEventPair));
    }

    #[tokio::test]
    async fn keys_follow_input_order() {
        let dims = InMemoryDimensions::new();
        let first = dims.register(Dimension::Product, "10");
        let second = dims.register(Dimension::Product, "20");
        let drafts = vec![
            draft_for(candidate(2, 20, None), None),
            draft_for(candidate(1, 10, None), None),
        ];

        let resolution = DimensionResolver::new(dims).resolve(&drafts).await.unwrap();
        assert_eq!(resolution.keys[0].product_key, second);
        assert_eq!(resolution.keys[1].product_key, first);
    }

    #[tokio::test]
    async fn unavailable_source_is_an_error() {
        let dims = InMemoryDimensions::new();
        dims.set_unavailable(true);
        let draft = draft_for(candidate(1, 10, None), None);

        let err = DimensionResolver::new(dims).resolve(&[draft]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
