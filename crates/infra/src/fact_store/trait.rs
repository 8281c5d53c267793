use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use listing_facts_core::{ListingFingerprint, ListingId};
use listing_facts_listings::{CommittedState, FactRow};

use super::schema::{ColumnSpec, SchemaPlan};

/// Fact store operation error.
///
/// ## Error Categories
///
/// - **Unavailable**: the store cannot be reached (fatal for the batch)
/// - **Timeout**: a statement or the commit timed out (transient, retry the batch)
/// - **SchemaIncompatible**: the schema cannot be reconciled additively (fatal)
/// - **Conflict**: the store changed underneath the batch (e.g. schema raced)
/// - **InvalidRow**: a row failed validation before it was written
#[derive(Debug, Clone, Error)]
pub enum FactStoreError {
    #[error("fact store unavailable: {0}")]
    Unavailable(String),

    #[error("fact store timeout: {0}")]
    Timeout(String),

    #[error("schema incompatible: {0}")]
    SchemaIncompatible(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl FactStoreError {
    /// Whether retrying the whole batch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FactStoreError::Timeout(_) | FactStoreError::Conflict(_))
    }
}

/// Outcome of one merge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Rows whose `(listing_id, updated_at)` key was absent.
    pub inserted: usize,
    /// Rows skipped because their key was already committed.
    pub skipped_existing: usize,
    pub columns_added: usize,
}

/// Append-only target store for listing fact rows.
///
/// The store doubles as its own history: previous states and the watermark are
/// read back from it.
#[async_trait::async_trait]
pub trait FactStore: Send + Sync {
    /// Greatest committed `updated_at`, `None` when the store is empty or absent.
    async fn max_updated_at(&self) -> Result<Option<DateTime<Utc>>, FactStoreError>;

    /// Every committed row whose fingerprint is in `fingerprints`.
    async fn history(
        &self,
        fingerprints: &[ListingFingerprint],
    ) -> Result<Vec<CommittedState>, FactStoreError>;

    /// Current columns; empty when the table does not exist.
    async fn columns(&self) -> Result<Vec<ColumnSpec>, FactStoreError>;

    /// Apply `plan` and insert every row whose key is absent, as one atomic unit.
    ///
    /// Existing keys are never overwritten. On error nothing is applied.
    async fn merge(
        &self,
        plan: &SchemaPlan,
        rows: Vec<FactRow>,
    ) -> Result<MergeOutcome, FactStoreError>;
}

#[async_trait::async_trait]
impl<S> FactStore for Arc<S>
where
    S: FactStore + ?Sized,
{
    async fn max_updated_at(&self) -> Result<Option<DateTime<Utc>>, FactStoreError> {
        (**self).max_updated_at().await
    }

    async fn history(
        &self,
        fingerprints: &[ListingFingerprint],
    ) -> Result<Vec<CommittedState>, FactStoreError> {
        (**self).history(fingerprints).await
    }

    async fn columns(&self) -> Result<Vec<ColumnSpec>, FactStoreError> {
        (**self).columns().await
    }

    async fn merge(
        &self,
        plan: &SchemaPlan,
        rows: Vec<FactRow>,
    ) -> Result<MergeOutcome, FactStoreError> {
        (**self).merge(plan, rows).await
    }
}

/// Reject rows that would corrupt the log before anything is written.
///
/// Checks that the stored fingerprint belongs to the row's listing and that no
/// merge key repeats within the batch.
pub fn validate_rows(rows: &[FactRow]) -> Result<(), FactStoreError> {
    let mut seen: std::collections::HashSet<(ListingId, DateTime<Utc>)> =
        std::collections::HashSet::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        if row.fingerprint != ListingFingerprint::of(row.listing_id) {
            return Err(FactStoreError::InvalidRow(format!(
                "fingerprint does not match listing {} (index {idx})",
                row.listing_id
            )));
        }
        if !seen.insert(row.merge_key()) {
            return Err(FactStoreError::InvalidRow(format!(
                "duplicate merge key for listing {} at {} (index {idx})",
                row.listing_id, row.updated_at
            )));
        }
    }
    Ok(())
}
