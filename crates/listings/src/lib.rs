//! Listings domain module.
//!
//! Pure, deterministic logic for turning source records into classified
//! listing fact rows: aggregation, previous-state ranking, and change
//! classification. No IO, no storage.

pub mod aggregate;
pub mod classifier;
pub mod fact;
pub mod snapshot;
pub mod source;

pub use aggregate::{
    ProductAggregate, StockAggregate, aggregate_prices, aggregate_products, aggregate_stock,
    aggregate_taxons, aggregate_variants,
};
pub use classifier::{
    ClassificationRule, CurrentState, EventAction, EventPair, EventType, RuleChain, RuleOrder,
};
pub use fact::{DimensionKeys, FactDraft, FactRow, current_state};
pub use snapshot::{CommittedState, PreviousSnapshot, previous_snapshots, rank_previous};
pub use source::{
    CandidateListing, Listing, ListingTaxon, PriceRecord, Product, ProductOwner, StockItem, Taxon,
    Variant,
};
