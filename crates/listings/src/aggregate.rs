//! Source aggregators.
//!
//! Each aggregator collapses a one-to-many source relationship into a single
//! representative value per subject (product or listing). They are total: a
//! subject with no matching source rows simply has no entry, and callers
//! default the missing aggregate instead of failing.
//!
//! The representative-selection conventions are exposed as named tie-break
//! functions so they can be pinned by tests independently of input order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use listing_facts_core::{ListingId, Money, ProductId, StockLocationId, TaxonId, VariantId};

use crate::source::{ListingTaxon, PriceRecord, StockItem, Taxon, Variant};

/// Summed on-hand stock for a product plus one representative location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockAggregate {
    pub quantity: i64,
    pub stock_location_id: Option<StockLocationId>,
}

/// Everything known about a product's current variant, stock and price.
///
/// Every part is optional; accessors apply the zero defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductAggregate {
    pub variant_id: Option<VariantId>,
    pub stock: Option<StockAggregate>,
    pub price: Option<Money>,
}

impl ProductAggregate {
    pub fn stock_quantity(&self) -> i64 {
        self.stock.map(|s| s.quantity).unwrap_or(0)
    }

    pub fn stock_location_id(&self) -> Option<StockLocationId> {
        self.stock.and_then(|s| s.stock_location_id)
    }

    pub fn price(&self) -> Money {
        self.price.clone().unwrap_or_else(Money::zero)
    }
}

/// Tie-break: keep the lowest identity seen so far.
pub fn lowest_identity<T: Ord>(current: Option<T>, candidate: T) -> Option<T> {
    match current {
        Some(existing) if existing <= candidate => Some(existing),
        _ => Some(candidate),
    }
}

/// Tie-break: keep the first non-null value encountered, in input order.
///
/// This carries no business meaning when several candidates exist; it only
/// guarantees a stable answer for a stable input order.
pub fn first_non_null<T>(current: Option<T>, candidate: Option<T>) -> Option<T> {
    current.or(candidate)
}

/// Sort key for primary-taxon selection: taxons with a parent (more specific)
/// first, then ascending identity.
pub fn primary_taxon_order(taxon_id: TaxonId, parent_id: Option<TaxonId>) -> (bool, TaxonId) {
    (parent_id.is_none(), taxon_id)
}

/// Variant → product index restricted to live variants of in-scope products.
fn live_variants(
    scope: &HashSet<ProductId>,
    variants: &[Variant],
) -> HashMap<VariantId, ProductId> {
    variants
        .iter()
        .filter(|v| !v.is_deleted() && scope.contains(&v.product_id))
        .map(|v| (v.variant_id, v.product_id))
        .collect()
}

/// Per product, the lowest-identity non-deleted variant.
pub fn aggregate_variants(
    scope: &HashSet<ProductId>,
    variants: &[Variant],
) -> HashMap<ProductId, VariantId> {
    let mut out: HashMap<ProductId, VariantId> = HashMap::new();
    for v in variants {
        if v.is_deleted() || !scope.contains(&v.product_id) {
            continue;
        }
        let current = out.get(&v.product_id).copied();
        if let Some(chosen) = lowest_identity(current, v.variant_id) {
            out.insert(v.product_id, chosen);
        }
    }
    out
}

/// Per product, on-hand quantity summed over non-deleted stock records of
/// non-deleted variants, plus the first non-null stock location encountered.
///
/// The sum saturates at the `i64` bounds.
pub fn aggregate_stock(
    scope: &HashSet<ProductId>,
    variants: &[Variant],
    stock_items: &[StockItem],
) -> HashMap<ProductId, StockAggregate> {
    let live = live_variants(scope, variants);
    let mut out: HashMap<ProductId, StockAggregate> = HashMap::new();

    for item in stock_items {
        if item.deleted_at.is_some() {
            continue;
        }
        let Some(product_id) = live.get(&item.variant_id) else {
            continue;
        };
        let agg = out.entry(*product_id).or_default();
        agg.quantity = agg.quantity.saturating_add(item.count_on_hand);
        agg.stock_location_id = first_non_null(agg.stock_location_id, item.stock_location_id);
    }

    out
}

/// Per product, price and currency of the lowest-identity non-deleted price
/// record attached to a non-deleted variant.
pub fn aggregate_prices(
    scope: &HashSet<ProductId>,
    variants: &[Variant],
    prices: &[PriceRecord],
) -> HashMap<ProductId, Money> {
    let live = live_variants(scope, variants);
    let mut chosen: HashMap<ProductId, &PriceRecord> = HashMap::new();

    for price in prices {
        if price.deleted_at.is_some() {
            continue;
        }
        let Some(product_id) = live.get(&price.variant_id) else {
            continue;
        };
        match chosen.get(product_id) {
            Some(existing) if existing.price_id <= price.price_id => {}
            _ => {
                chosen.insert(*product_id, price);
            }
        }
    }

    chosen
        .into_iter()
        .map(|(product_id, p)| {
            (
                product_id,
                Money {
                    amount_minor: p.amount_minor.unwrap_or(0),
                    currency: p.currency.clone(),
                },
            )
        })
        .collect()
}

/// Per listing, the primary taxon: first by `primary_taxon_order`.
///
/// Associations pointing at a taxon the taxon source does not know are kept
/// and treated as parentless.
pub fn aggregate_taxons(
    scope: &HashSet<ListingId>,
    listing_taxons: &[ListingTaxon],
    taxons: &[Taxon],
) -> HashMap<ListingId, TaxonId> {
    let parents: HashMap<TaxonId, Option<TaxonId>> =
        taxons.iter().map(|t| (t.taxon_id, t.parent_id)).collect();

    let mut best: HashMap<ListingId, (bool, TaxonId)> = HashMap::new();
    for lt in listing_taxons {
        if !scope.contains(&lt.listing_id) {
            continue;
        }
        let parent = parents.get(&lt.taxon_id).copied().flatten();
        let key = primary_taxon_order(lt.taxon_id, parent);
        match best.get(&lt.listing_id) {
            Some(existing) if *existing <= key => {}
            _ => {
                best.insert(lt.listing_id, key);
            }
        }
    }

    best.into_iter()
        .map(|(listing_id, (_, taxon_id))| (listing_id, taxon_id))
        .collect()
}

/// Combine the product-scoped aggregators into one `ProductAggregate` per
/// in-scope product. Products with no source rows get an all-`None` entry.
pub fn aggregate_products(
    scope: &HashSet<ProductId>,
    variants: HashMap<ProductId, VariantId>,
    mut stock: HashMap<ProductId, StockAggregate>,
    mut prices: HashMap<ProductId, Money>,
) -> HashMap<ProductId, ProductAggregate> {
    scope
        .iter()
        .map(|product_id| {
            (
                *product_id,
                ProductAggregate {
                    variant_id: variants.get(product_id).copied(),
                    stock: stock.remove(product_id),
                    price: prices.remove(product_id),
                },
            )
        })
        .collect()
}
