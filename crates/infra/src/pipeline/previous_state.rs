//! Previous-state resolution against the target store's own history.

use std::collections::HashMap;

use tracing::{Span, instrument};

use listing_facts_core::{ListingFingerprint, ListingId};
use listing_facts_listings::{PreviousSnapshot, previous_snapshots};

use crate::fact_store::{FactStore, FactStoreError};

/// Rank-1 previous snapshot per listing; `PreviousSnapshot::none()` when the
/// listing was never committed.
#[instrument(skip(store, listing_ids), fields(listing_count = listing_ids.len(), with_prior), err)]
pub async fn resolve_previous<F>(
    store: &F,
    listing_ids: &[ListingId],
) -> Result<HashMap<ListingId, PreviousSnapshot>, FactStoreError>
where
    F: FactStore + ?Sized,
{
    let fingerprints: Vec<(ListingId, ListingFingerprint)> = listing_ids
        .iter()
        .map(|id| (*id, ListingFingerprint::of(*id)))
        .collect();

    let wanted: Vec<ListingFingerprint> = fingerprints.iter().map(|(_, fp)| fp.clone()).collect();
    let history = store.history(&wanted).await?;
    let ranked = previous_snapshots(&history);

    let resolved: HashMap<ListingId, PreviousSnapshot> = fingerprints
        .into_iter()
        .map(|(id, fp)| (id, ranked.get(&fp).copied().unwrap_or_else(PreviousSnapshot::none)))
        .collect();

    Span::current().record("with_prior", resolved.values().filter(|p| p.has_prior).count());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact_store::{InMemoryFactStore, fact_columns, reconcile};
    use crate::test_support::{candidate, draft_for, ts};
    use listing_facts_listings::{DimensionKeys, FactRow};
    use uuid::Uuid;

    fn committed(id: i64, updated: i64, stock: i64, deleted: bool) -> FactRow {
        let mut draft = draft_for(candidate(id, 10, None), None);
        draft.listing.updated_at = ts(updated);
        draft.listing.deleted_at = deleted.then(|| ts(updated));
        let mut row = FactRow::from_draft(draft, DimensionKeys::unknown(), ts(1_000), Uuid::now_v7());
        row.stock_quantity = stock;
        row
    }

    #[tokio::test]
    async fn first_observation_defaults_to_none() {
        let store = InMemoryFactStore::new();
        let resolved = resolve_previous(&store, &[ListingId::new(1)]).await.unwrap();
        assert_eq!(resolved[&ListingId::new(1)], PreviousSnapshot::none());
    }

    #[tokio::test]
    async fn picks_latest_live_row() {
        let store = InMemoryFactStore::new();
        let plan = reconcile(&[], &fact_columns()).unwrap();
        store
            .merge(
                &plan,
                vec![
                    committed(1, 10, 4, false),
                    committed(1, 20, 6, false),
                    committed(1, 30, 99, true),
                    committed(2, 10, 1, false),
                ],
            )
            .await
            .unwrap();

        let resolved = resolve_previous(&store, &[ListingId::new(1), ListingId::new(3)])
            .await
            .unwrap();

        let first = resolved[&ListingId::new(1)];
        assert!(first.has_prior);
        assert_eq!(first.stock_quantity, 6);
        assert!(!resolved[&ListingId::new(3)].has_prior);
        assert!(!resolved.contains_key(&ListingId::new(2)));
    }
}
