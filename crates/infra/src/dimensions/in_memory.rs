use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use listing_facts_core::SurrogateKey;

use super::taxonomy::EventTaxonomy;
use super::r#trait::{Dimension, DimensionError, DimensionSource};

/// In-memory dimension tables for tests/dev.
///
/// Starts with the standard event taxonomy and empty keyed dimensions.
#[derive(Debug)]
pub struct InMemoryDimensions {
    keys: RwLock<HashMap<Dimension, HashMap<String, SurrogateKey>>>,
    taxonomy: RwLock<EventTaxonomy>,
    unavailable: AtomicBool,
}

impl Default for InMemoryDimensions {
    fn default() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            taxonomy: RwLock::new(EventTaxonomy::standard()),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl InMemoryDimensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, dimension: Dimension, natural_key: impl Into<String>, key: SurrogateKey) {
        if let Ok(mut keys) = self.keys.write() {
            keys.entry(dimension).or_default().insert(natural_key.into(), key);
        }
    }

    /// Register a natural key with a key derived from `(dimension, natural_key)`.
    pub fn register(&self, dimension: Dimension, natural_key: impl Into<String>) -> SurrogateKey {
        let natural_key = natural_key.into();
        let key = SurrogateKey::derive([dimension.as_str(), natural_key.as_str()]);
        self.insert(dimension, natural_key, key.clone());
        key
    }

    pub fn set_event_taxonomy(&self, taxonomy: EventTaxonomy) {
        if let Ok(mut slot) = self.taxonomy.write() {
            *slot = taxonomy;
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DimensionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DimensionError::Unavailable(
                "in-memory dimensions marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DimensionSource for InMemoryDimensions {
    async fn lookup_many(
        &self,
        dimension: Dimension,
        natural_keys: &[String],
    ) -> Result<HashMap<String, SurrogateKey>, DimensionError> {
        self.check_available()?;
        let keys = self
            .keys
            .read()
            .map_err(|_| DimensionError::Unavailable("lock poisoned".to_string()))?;

        let Some(table) = keys.get(&dimension) else {
            return Ok(HashMap::new());
        };
        Ok(natural_keys
            .iter()
            .filter_map(|nk| table.get(nk).map(|sk| (nk.clone(), sk.clone())))
            .collect())
    }

    async fn event_taxonomy(&self) -> Result<EventTaxonomy, DimensionError> {
        self.check_available()?;
        self.taxonomy
            .read()
            .map(|t| t.clone())
            .map_err(|_| DimensionError::Unavailable("lock poisoned".to_string()))
    }
}
