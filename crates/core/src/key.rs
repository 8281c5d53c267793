//! Warehouse-side keys: surrogate keys and listing identity fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::id::ListingId;

/// Sentinel surrogate key substituted when a natural key cannot be resolved.
pub const UNKNOWN_KEY: &str = "UNKNOWN";

/// Stable, warehouse-internal identifier substituted for a natural key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(String);

impl SurrogateKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The `UNKNOWN` fallback key.
    pub fn unknown() -> Self {
        Self(UNKNOWN_KEY.to_string())
    }

    /// Deterministic key derived from one or more natural key parts.
    ///
    /// Parts are joined with `|` before hashing so `("a", "bc")` and
    /// `("ab", "c")` never collide.
    pub fn derive<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("|");
        Self(format!("{:x}", Sha256::digest(joined.as_bytes())))
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity fingerprint of a listing in the target store.
///
/// Previously committed rows are matched to a listing through this value, not
/// through the raw natural key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingFingerprint(String);

impl ListingFingerprint {
    pub fn of(listing_id: ListingId) -> Self {
        let SurrogateKey(hex) = SurrogateKey::derive(["listing", &listing_id.natural_key()]);
        Self(hex)
    }

    /// Wrap a fingerprint read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ListingFingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
