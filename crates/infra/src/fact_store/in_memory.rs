use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

use listing_facts_core::{ListingFingerprint, ListingId};
use listing_facts_listings::{CommittedState, FactRow};

use super::r#trait::{FactStore, FactStoreError, MergeOutcome, validate_rows};
use super::schema::{ColumnSpec, SchemaPlan};

#[derive(Debug, Default, Clone)]
struct State {
    columns: Vec<ColumnSpec>,
    rows: BTreeMap<(ListingId, DateTime<Utc>), FactRow>,
}

/// In-memory append-only fact store.
///
/// Intended for tests/dev. A merge builds the next state on a copy and swaps
/// it in only when every step succeeded.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    state: RwLock<State>,
    next_failure: Mutex<Option<FactStoreError>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing table with the given columns and no rows.
    pub fn with_columns(columns: Vec<ColumnSpec>) -> Self {
        Self {
            state: RwLock::new(State {
                columns,
                rows: BTreeMap::new(),
            }),
            next_failure: Mutex::new(None),
        }
    }

    /// Make the next merge fail with `err` after the plan and rows were staged.
    pub fn fail_next_merge(&self, err: FactStoreError) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(err);
        }
    }

    /// Committed rows in merge-key order.
    pub fn rows(&self) -> Vec<FactRow> {
        self.state
            .read()
            .map(|s| s.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn columns_snapshot(&self) -> Vec<ColumnSpec> {
        self.state
            .read()
            .map(|s| s.columns.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, FactStoreError> {
        self.state
            .read()
            .map_err(|_| FactStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn take_failure(&self) -> Option<FactStoreError> {
        self.next_failure.lock().ok().and_then(|mut slot| slot.take())
    }

    fn apply_plan(columns: &mut Vec<ColumnSpec>, plan: &SchemaPlan) -> Result<usize, FactStoreError> {
        if plan.create_table {
            if !columns.is_empty() {
                return Err(FactStoreError::Conflict(
                    "table was created after the schema plan was made".to_string(),
                ));
            }
            *columns = plan.desired.clone();
            return Ok(0);
        }

        let mut added = 0;
        for col in &plan.add_columns {
            match columns.iter().find(|c| c.name == col.name) {
                Some(have) if have.kind != col.kind => {
                    return Err(FactStoreError::SchemaIncompatible(format!(
                        "column '{}' already exists as {}",
                        col.name, have.kind
                    )));
                }
                Some(_) => {}
                None => {
                    columns.push(col.clone());
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

#[async_trait::async_trait]
impl FactStore for InMemoryFactStore {
    async fn max_updated_at(&self) -> Result<Option<DateTime<Utc>>, FactStoreError> {
        let state = self.read()?;
        Ok(state.rows.values().map(|r| r.updated_at).max())
    }

    async fn history(
        &self,
        fingerprints: &[ListingFingerprint],
    ) -> Result<Vec<CommittedState>, FactStoreError> {
        let state = self.read()?;
        let wanted: HashSet<&ListingFingerprint> = fingerprints.iter().collect();
        Ok(state
            .rows
            .values()
            .filter(|r| wanted.contains(&r.fingerprint))
            .map(FactRow::committed_state)
            .collect())
    }

    async fn columns(&self) -> Result<Vec<ColumnSpec>, FactStoreError> {
        Ok(self.read()?.columns.clone())
    }

    async fn merge(
        &self,
        plan: &SchemaPlan,
        rows: Vec<FactRow>,
    ) -> Result<MergeOutcome, FactStoreError> {
        validate_rows(&rows)?;

        let mut state = self
            .state
            .write()
            .map_err(|_| FactStoreError::Unavailable("lock poisoned".to_string()))?;

        let mut next = state.clone();
        let columns_added = Self::apply_plan(&mut next.columns, plan)?;

        let mut outcome = MergeOutcome {
            columns_added,
            ..MergeOutcome::default()
        };
        for row in rows {
            let key = row.merge_key();
            if next.rows.contains_key(&key) {
                outcome.skipped_existing += 1;
            } else {
                next.rows.insert(key, row);
                outcome.inserted += 1;
            }
        }

        if let Some(err) = self.take_failure() {
            return Err(err);
        }

        *state = next;
        Ok(outcome)
    }
}
