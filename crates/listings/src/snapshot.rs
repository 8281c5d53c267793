//! Previous-state reconstruction from the target store's own history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use listing_facts_core::ListingFingerprint;

/// Comparison attributes of one previously committed fact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedState {
    pub fingerprint: ListingFingerprint,
    pub stock_quantity: i64,
    pub price_minor: i64,
    pub is_approved: bool,
    pub is_published: bool,
    pub is_deleted: bool,
    pub updated_at: DateTime<Utc>,
    pub extracted_at: DateTime<Utc>,
}

/// The state a listing is compared against.
///
/// Absence of history is modeled as zero/false values with `has_prior = false`,
/// never as null: the zero defaults take part in the stock and price rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousSnapshot {
    pub stock_quantity: i64,
    pub price_minor: i64,
    pub is_approved: bool,
    pub is_published: bool,
    pub has_prior: bool,
}

impl PreviousSnapshot {
    /// Defaulted snapshot for a listing never committed before.
    pub const fn none() -> Self {
        Self {
            stock_quantity: 0,
            price_minor: 0,
            is_approved: false,
            is_published: false,
            has_prior: false,
        }
    }

    pub fn was_active(&self) -> bool {
        self.is_approved && self.is_published
    }
}

impl Default for PreviousSnapshot {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&CommittedState> for PreviousSnapshot {
    fn from(row: &CommittedState) -> Self {
        Self {
            stock_quantity: row.stock_quantity,
            price_minor: row.price_minor,
            is_approved: row.is_approved,
            is_published: row.is_published,
            has_prior: true,
        }
    }
}

/// Pick the rank-1 row among rows sharing one fingerprint.
///
/// Ranking: not-deleted before deleted, then `updated_at` descending, then
/// `extracted_at` descending.
pub fn rank_previous<'a, I>(rows: I) -> Option<&'a CommittedState>
where
    I: IntoIterator<Item = &'a CommittedState>,
{
    rows.into_iter().min_by(|a, b| {
        a.is_deleted
            .cmp(&b.is_deleted)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| b.extracted_at.cmp(&a.extracted_at))
    })
}

/// Rank committed history per fingerprint and return each rank-1 snapshot.
pub fn previous_snapshots(rows: &[CommittedState]) -> HashMap<ListingFingerprint, PreviousSnapshot> {
    let mut grouped: HashMap<&ListingFingerprint, Vec<&CommittedState>> = HashMap::new();
    for row in rows {
        grouped.entry(&row.fingerprint).or_default().push(row);
    }

    grouped
        .into_iter()
        .filter_map(|(fp, group)| {
            rank_previous(group).map(|best| (fp.clone(), PreviousSnapshot::from(best)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use listing_facts_core::ListingId;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn row(qty: i64, deleted: bool, updated: i64, extracted: i64) -> CommittedState {
        CommittedState {
            fingerprint: ListingFingerprint::of(ListingId::new(1)),
            stock_quantity: qty,
            price_minor: 100,
            is_approved: true,
            is_published: true,
            is_deleted: deleted,
            updated_at: t(updated),
            extracted_at: t(extracted),
        }
    }

    #[test]
    fn empty_history_has_no_rank_one() {
        assert!(rank_previous(&Vec::<CommittedState>::new()).is_none());
        assert!(previous_snapshots(&[]).is_empty());
    }

    #[test]
    fn prefers_not_deleted_over_newer_deleted() {
        let rows = vec![row(1, false, 10, 10), row(2, true, 99, 99)];
        assert_eq!(rank_previous(&rows).unwrap().stock_quantity, 1);
    }

    #[test]
    fn prefers_latest_updated_then_latest_extracted() {
        let rows = vec![
            row(1, false, 10, 50),
            row(2, false, 20, 30),
            row(3, false, 20, 40),
        ];
        assert_eq!(rank_previous(&rows).unwrap().stock_quantity, 3);
    }

    #[test]
    fn snapshot_marks_prior_record() {
        let rows = vec![row(4, false, 1, 1)];
        let snaps = previous_snapshots(&rows);
        let snap = snaps[&ListingFingerprint::of(ListingId::new(1))];
        assert!(snap.has_prior);
        assert_eq!(snap.stock_quantity, 4);
        assert!(snap.was_active());
    }

    #[test]
    fn none_is_zero_valued_without_prior() {
        let none = PreviousSnapshot::none();
        assert_eq!(none, PreviousSnapshot::default());
        assert!(!none.has_prior);
        assert!(!none.was_active());
        assert_eq!((none.stock_quantity, none.price_minor), (0, 0));
    }
}
