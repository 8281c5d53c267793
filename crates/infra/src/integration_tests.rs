//! Integration tests for the full listing fact batch.
//!
//! Tests: SourceCatalog → aggregation → previous state → classification →
//! DimensionResolver → FactStore
//!
//! Verifies:
//! - Classification scenarios end to end across consecutive batches
//! - Re-running an unchanged batch writes nothing
//! - Unresolved dimensions never drop a row
//! - The store is an append-only log and failed batches leave no rows

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use listing_facts_core::{ListingId, ProductId, VariantId};
    use listing_facts_listings::{
        EventAction, EventPair, EventType, FactRow, PriceRecord, RuleChain, StockItem, Variant,
        current_state,
    };

    use crate::dimensions::{Dimension, InMemoryDimensions};
    use crate::fact_store::{
        ColumnKind, ColumnSpec, FactStoreError, InMemoryFactStore, fact_columns,
    };
    use crate::pipeline::{
        BatchPipeline, BatchStatus, PipelineError, RunOptions, Watermark,
    };
    use crate::source::InMemorySourceCatalog;
    use crate::test_support::{listing, ts};

    type Pipeline =
        BatchPipeline<Arc<InMemorySourceCatalog>, Arc<InMemoryDimensions>, Arc<InMemoryFactStore>>;

    struct Harness {
        source: Arc<InMemorySourceCatalog>,
        dimensions: Arc<InMemoryDimensions>,
        store: Arc<InMemoryFactStore>,
        pipeline: Pipeline,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(InMemoryFactStore::new(), RuleChain::standard())
        }

        fn with(store: InMemoryFactStore, chain: RuleChain) -> Self {
            let source = Arc::new(InMemorySourceCatalog::new());
            let dimensions = Arc::new(InMemoryDimensions::new());
            let store = Arc::new(store);
            let pipeline = BatchPipeline::new(source.clone(), dimensions.clone(), store.clone(), chain);
            Self {
                source,
                dimensions,
                store,
                pipeline,
            }
        }

        /// Listing `id` on product `id * 10` with variant `id * 100`.
        fn put_listing(&self, id: i64, updated_secs: i64, approved: bool, published: bool) {
            let mut l = listing(id, id * 10, updated_secs);
            l.is_approved = approved;
            l.is_published = published;
            self.source.upsert_listing(l);
            self.source.upsert_variant(Variant {
                variant_id: VariantId::new(id * 100),
                product_id: ProductId::new(id * 10),
                deleted_at: None,
            });
        }

        fn put_stock(&self, id: i64, quantity: i64) {
            self.source.upsert_stock_item(StockItem {
                stock_item_id: id * 1000,
                variant_id: VariantId::new(id * 100),
                stock_location_id: None,
                count_on_hand: quantity,
                deleted_at: None,
            });
        }

        fn put_price(&self, id: i64, amount_minor: i64) {
            self.source.upsert_price(PriceRecord {
                price_id: id * 1000,
                variant_id: VariantId::new(id * 100),
                amount_minor: Some(amount_minor),
                currency: Some("USD".to_string()),
                deleted_at: None,
            });
        }

        async fn run(&self) -> Result<crate::pipeline::BatchReport, PipelineError> {
            self.pipeline.run(RunOptions::default()).await
        }

        fn rows_for(&self, id: i64) -> Vec<FactRow> {
            self.store
                .rows()
                .into_iter()
                .filter(|r| r.listing_id == ListingId::new(id))
                .collect()
        }

        fn latest_event(&self, id: i64) -> EventPair {
            let rows = self.store.rows();
            let current = current_state(&rows);
            current[&ListingId::new(id)].event
        }
    }

    fn pair(t: EventType, a: EventAction) -> EventPair {
        EventPair::new(t, a)
    }

    #[tokio::test]
    async fn scenario_a_stock_increase() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.put_stock(1, 5);
        h.put_price(1, 1000);
        h.run().await.unwrap();

        h.put_listing(1, 20, false, false);
        h.put_stock(1, 8);
        let report = h.run().await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(h.latest_event(1), pair(EventType::Stock, EventAction::UpdateInc));
    }

    #[tokio::test]
    async fn scenario_b_published() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.put_price(1, 1000);
        h.run().await.unwrap();
        assert_eq!(h.latest_event(1), pair(EventType::Price, EventAction::UpdateInc));

        h.put_listing(1, 20, true, true);
        h.run().await.unwrap();
        assert_eq!(h.latest_event(1), pair(EventType::Listing, EventAction::Published));
    }

    #[tokio::test]
    async fn scenario_c_create() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.run().await.unwrap();

        let rows = h.rows_for(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event, pair(EventType::Listing, EventAction::Create));
        assert_eq!(rows[0].stock_quantity, 0);
        assert_eq!(rows[0].price.amount_minor, 0);
        assert!(!rows[0].has_stock);
        assert!(!rows[0].is_active);
    }

    #[tokio::test]
    async fn scenario_d_first_observation_with_stock() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.put_stock(1, 3);
        h.run().await.unwrap();
        assert_eq!(h.latest_event(1), pair(EventType::Stock, EventAction::UpdateInc));

        let create_first = Harness::with(InMemoryFactStore::new(), RuleChain::create_first());
        create_first.put_listing(1, 10, false, false);
        create_first.put_stock(1, 3);
        create_first.run().await.unwrap();
        assert_eq!(
            create_first.latest_event(1),
            pair(EventType::Listing, EventAction::Create)
        );
    }

    #[tokio::test]
    async fn scenario_e_stock_dominates_price() {
        let h = Harness::new();
        h.put_listing(1, 10, true, true);
        h.put_stock(1, 10);
        h.put_price(1, 1000);
        h.run().await.unwrap();

        h.put_listing(1, 20, true, true);
        h.put_stock(1, 7);
        h.put_price(1, 1200);
        h.run().await.unwrap();

        assert_eq!(h.latest_event(1), pair(EventType::Stock, EventAction::UpdateDec));
    }

    #[tokio::test]
    async fn unchanged_rerun_writes_nothing() {
        let h = Harness::new();
        for id in 1..=3 {
            h.put_listing(id, id * 10, true, true);
            h.put_stock(id, id);
        }
        let first = h.run().await.unwrap();
        assert_eq!(first.inserted, 3);

        let second = h.run().await.unwrap();
        assert_eq!(second.status, BatchStatus::Empty);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.watermark, Watermark::After(ts(30)));

        let refreshed = h.pipeline.run(RunOptions::full_refresh()).await.unwrap();
        assert_eq!(refreshed.candidates, 3);
        assert_eq!(refreshed.inserted, 0);
        assert_eq!(refreshed.skipped_existing, 3);
        assert_eq!(h.store.len(), 3);
    }

    #[tokio::test]
    async fn unresolved_dimensions_fall_back_to_unknown() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        let report = h.run().await.unwrap();

        let rows = h.rows_for(1);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].keys.product_key.is_unknown());
        assert!(rows[0].keys.channel_key.is_unknown());
        assert!(!rows[0].keys.event_key.is_unknown());
        assert!(report.warnings > 0);
    }

    #[tokio::test]
    async fn resolved_dimensions_are_written() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        let product_key = h.dimensions.register(Dimension::Product, "10");
        let date_key = h.dimensions.register(Dimension::Date, ts(0).format("%Y-%m-%d").to_string());

        h.run().await.unwrap();
        let row = &h.rows_for(1)[0];
        assert_eq!(row.keys.product_key, product_key);
        assert_eq!(row.keys.created_date_key, date_key);
    }

    #[tokio::test]
    async fn history_is_append_only() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.run().await.unwrap();
        for (updated, qty) in [(20, 4), (30, 2), (40, 9)] {
            h.put_listing(1, updated, false, false);
            h.put_stock(1, qty);
            h.run().await.unwrap();
        }

        let rows = h.rows_for(1);
        assert_eq!(rows.len(), 4);
        let events: Vec<EventPair> = rows.iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec![
                pair(EventType::Listing, EventAction::Create),
                pair(EventType::Stock, EventAction::UpdateInc),
                pair(EventType::Stock, EventAction::UpdateDec),
                pair(EventType::Stock, EventAction::UpdateInc),
            ]
        );

        let all = h.store.rows();
        let current = current_state(&all);
        assert_eq!(current[&ListingId::new(1)].updated_at, ts(40));
        assert_eq!(current[&ListingId::new(1)].stock_quantity, 9);
    }

    #[tokio::test]
    async fn failed_commit_leaves_store_untouched() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.put_listing(2, 20, false, false);
        h.store.fail_next_merge(FactStoreError::Timeout("commit timed out".to_string()));

        let err = h.run().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(h.store.is_empty());
        assert!(h.store.columns_snapshot().is_empty());

        let retried = h.run().await.unwrap();
        assert_eq!(retried.watermark, Watermark::FullRebuild);
        assert_eq!(retried.inserted, 2);
    }

    #[tokio::test]
    async fn unavailable_source_is_retryable() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.source.set_unavailable(true);

        let err = h.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
        assert!(err.is_retryable());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.store.fail_next_merge(FactStoreError::Unavailable("connection refused".to_string()));

        let err = h.run().await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn schema_grows_additively() {
        let existing: Vec<_> = fact_columns()
            .into_iter()
            .filter(|c| c.name != "has_stock" && c.name != "batch_id")
            .collect();
        let h = Harness::with(InMemoryFactStore::with_columns(existing), RuleChain::standard());
        h.put_listing(1, 10, false, false);

        let report = h.run().await.unwrap();
        assert_eq!(report.columns_added, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(h.store.columns_snapshot().len(), fact_columns().len());
    }

    #[tokio::test]
    async fn incompatible_schema_aborts_before_commit() {
        let mut existing = fact_columns();
        if let Some(c) = existing.iter_mut().find(|c| c.name == "stock_quantity") {
            c.kind = ColumnKind::Text;
        }
        let h = Harness::with(InMemoryFactStore::with_columns(existing), RuleChain::standard());
        h.put_listing(1, 10, false, false);

        let err = h.run().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FactStore(FactStoreError::SchemaIncompatible(_))
        ));
        assert!(!err.is_retryable());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn required_column_the_batch_never_writes_aborts() {
        let mut existing = fact_columns();
        existing.push(ColumnSpec::new("region_code", ColumnKind::Text, false));
        let h = Harness::with(InMemoryFactStore::with_columns(existing), RuleChain::standard());
        h.put_listing(1, 10, false, false);

        let err = h.run().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FactStore(FactStoreError::SchemaIncompatible(_))
        ));
        assert!(!err.is_retryable());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn injected_watermark_limits_candidates() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.put_listing(2, 20, false, false);
        h.put_listing(3, 30, false, false);

        let report = h
            .pipeline
            .run(RunOptions {
                watermark: Some(Watermark::After(ts(15))),
                full_refresh: false,
            })
            .await
            .unwrap();

        assert_eq!(report.watermark, Watermark::After(ts(15)));
        assert_eq!(report.candidates, 2);
        assert!(h.rows_for(1).is_empty());
    }

    #[tokio::test]
    async fn report_counts_events() {
        let h = Harness::new();
        h.put_listing(1, 10, false, false);
        h.put_listing(2, 20, false, false);
        h.put_stock(2, 1);
        h.put_listing(3, 30, false, false);

        let report = h.run().await.unwrap();
        assert_eq!(report.status, BatchStatus::Committed);
        assert_eq!(report.events.get("listing/create"), Some(&2));
        assert_eq!(report.events.get("stock/update-inc"), Some(&1));
    }

    #[tokio::test]
    async fn deleted_listing_is_still_recorded() {
        let h = Harness::new();
        h.put_listing(1, 10, true, true);
        h.run().await.unwrap();

        let mut deleted = listing(1, 10, 20);
        deleted.deleted_at = Some(ts(20));
        h.source.upsert_listing(deleted);
        h.run().await.unwrap();

        let rows = h.rows_for(1);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].is_deleted());
        assert_eq!(rows[1].event, pair(EventType::Listing, EventAction::Unpublished));
    }
}
