//! `listing-facts-core`: foundation building blocks for the listing fact engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): natural
//! keys as they exist in the source systems, warehouse surrogate keys, and the
//! small value objects shared by the domain and infra crates.

pub mod error;
pub mod id;
pub mod key;
pub mod value_object;

pub use error::DomainError;
pub use id::{
    ChannelId, ListingId, ProductId, StockLocationId, StoreId, TaxonId, VariantId, VendorId,
};
pub use key::{ListingFingerprint, SurrogateKey, UNKNOWN_KEY};
pub use value_object::Money;
