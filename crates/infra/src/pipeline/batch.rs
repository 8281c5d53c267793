//! One batch: select → aggregate → previous state → classify → resolve → merge.
//!
//! The batch assumes it is the only writer of the target store. The watermark
//! is fixed at batch start; nothing is written until the final merge, which is
//! atomic, so a failure at any stage leaves the store untouched.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use listing_facts_core::ListingId;
use listing_facts_listings::{
    CandidateListing, EventPair, FactDraft, FactRow, PreviousSnapshot, RuleChain,
};

use crate::dimensions::{DimensionResolver, DimensionSource};
use crate::fact_store::{FactStore, fact_columns, reconcile};
use crate::source::SourceCatalog;

use super::aggregation::{BatchAggregates, load_aggregates};
use super::error::PipelineError;
use super::previous_state::resolve_previous;
use super::report::{BatchReport, BatchStatus};
use super::watermark::{Watermark, read_watermark, select_candidates};

/// Per-run options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Injected watermark; read from the store when `None`.
    pub watermark: Option<Watermark>,
    /// Ignore any watermark and reprocess every listing.
    pub full_refresh: bool,
}

impl RunOptions {
    pub fn full_refresh() -> Self {
        Self {
            watermark: None,
            full_refresh: true,
        }
    }
}

/// Classify every candidate against its previous snapshot.
///
/// Missing aggregates and missing history are defaulted, never errors.
pub fn build_drafts(
    chain: &RuleChain,
    candidates: Vec<CandidateListing>,
    aggregates: &BatchAggregates,
    previous: &HashMap<ListingId, PreviousSnapshot>,
) -> Vec<FactDraft> {
    candidates
        .into_iter()
        .map(|candidate| {
            let aggregate = aggregates.product(candidate.product_id());
            let taxon_id = aggregates.primary_taxon(candidate.listing_id());
            let prior = previous
                .get(&candidate.listing_id())
                .copied()
                .unwrap_or_else(PreviousSnapshot::none);

            let mut draft = FactDraft::new(candidate, aggregate, taxon_id, EventPair::FALLBACK);
            let (event, rule) = chain.classify_with_rule(&draft.current_state(), &prior);
            debug!(
                listing_id = %draft.listing_id(),
                event = %event,
                rule = rule.name(),
                "listing classified"
            );
            draft.event = event;
            draft
        })
        .collect()
}

pub struct BatchPipeline<S, D, F> {
    source: S,
    dimensions: DimensionResolver<D>,
    store: F,
    chain: RuleChain,
}

impl<S, D, F> BatchPipeline<S, D, F>
where
    S: SourceCatalog,
    D: DimensionSource,
    F: FactStore,
{
    pub fn new(source: S, dimensions: D, store: F, chain: RuleChain) -> Self {
        Self {
            source,
            dimensions: DimensionResolver::new(dimensions),
            store,
            chain,
        }
    }

    /// Run one batch and report what was committed.
    pub async fn run(&self, options: RunOptions) -> Result<BatchReport, PipelineError> {
        let batch_id = Uuid::now_v7();
        let span = info_span!("batch", batch_id = %batch_id, full_refresh = options.full_refresh);
        self.run_batch(batch_id, options).instrument(span).await
    }

    async fn run_batch(
        &self,
        batch_id: Uuid,
        options: RunOptions,
    ) -> Result<BatchReport, PipelineError> {
        let started_at = Utc::now();

        let watermark = match (options.full_refresh, options.watermark) {
            (true, _) => Watermark::FullRebuild,
            (false, Some(injected)) => injected,
            (false, None) => read_watermark(&self.store).await?,
        };
        info!(watermark = %watermark, "batch started");

        let candidates = select_candidates(&self.source, watermark).await?;
        if candidates.is_empty() {
            info!("no listings changed since watermark");
            return Ok(BatchReport::empty(batch_id, watermark, started_at));
        }
        let candidate_count = candidates.len();

        let aggregates = load_aggregates(&self.source, &candidates).await?;

        let listing_ids: Vec<ListingId> = candidates.iter().map(|c| c.listing_id()).collect();
        let previous = resolve_previous(&self.store, &listing_ids).await?;

        let drafts = build_drafts(&self.chain, candidates, &aggregates, &previous);
        let resolution = self.dimensions.resolve(&drafts).await?;

        let extracted_at = Utc::now();
        let rows: Vec<FactRow> = drafts
            .into_iter()
            .zip(resolution.keys)
            .map(|(draft, keys)| FactRow::from_draft(draft, keys, extracted_at, batch_id))
            .collect();

        let mut events: BTreeMap<String, usize> = BTreeMap::new();
        for row in &rows {
            *events.entry(row.event.to_string()).or_default() += 1;
        }

        let plan = reconcile(&self.store.columns().await?, &fact_columns())?;
        if !plan.retained_columns.is_empty() {
            info!(
                retained = ?plan.retained_columns,
                "store columns not written by this batch are left null"
            );
        }
        let outcome = self.store.merge(&plan, rows).await?;

        let report = BatchReport {
            batch_id,
            watermark,
            started_at,
            finished_at: Utc::now(),
            candidates: candidate_count,
            inserted: outcome.inserted,
            skipped_existing: outcome.skipped_existing,
            columns_added: outcome.columns_added,
            events,
            warnings: resolution.warnings.len(),
            status: BatchStatus::Committed,
        };

        info!(
            candidates = report.candidates,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            columns_added = report.columns_added,
            warnings = report.warnings,
            "batch committed"
        );
        Ok(report)
    }
}
