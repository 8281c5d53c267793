//! The event taxonomy collaborator: `(event_type, event_action)` → surrogate key.

use std::collections::HashMap;

use listing_facts_core::SurrogateKey;
use listing_facts_listings::EventPair;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventTaxonomy {
    keys: HashMap<EventPair, SurrogateKey>,
}

impl EventTaxonomy {
    /// Taxonomy covering the full declared cross product, with keys derived
    /// from the pair itself.
    pub fn standard() -> Self {
        Self::from_entries(EventPair::declared().into_iter().map(|pair| {
            let key = SurrogateKey::derive([
                "event",
                pair.event_type.as_str(),
                pair.event_action.as_str(),
            ]);
            (pair, key)
        }))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (EventPair, SurrogateKey)>,
    {
        Self {
            keys: entries.into_iter().collect(),
        }
    }

    pub fn lookup(&self, pair: &EventPair) -> Option<&SurrogateKey> {
        self.keys.get(pair)
    }

    /// Declared pairs with no entry.
    pub fn missing_pairs(&self) -> Vec<EventPair> {
        let mut missing: Vec<EventPair> = EventPair::declared()
            .into_iter()
            .filter(|p| !self.keys.contains_key(p))
            .collect();
        missing.sort();
        missing
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_facts_listings::{EventAction, EventType};

    #[test]
    fn standard_covers_every_declared_pair() {
        let taxonomy = EventTaxonomy::standard();
        assert_eq!(taxonomy.len(), 36);
        assert!(taxonomy.missing_pairs().is_empty());
    }

    #[test]
    fn standard_keys_are_distinct_and_stable() {
        let a = EventTaxonomy::standard();
        let b = EventTaxonomy::standard();
        let pair = EventPair::new(EventType::Stock, EventAction::UpdateInc);
        assert_eq!(a.lookup(&pair), b.lookup(&pair));

        let other = EventPair::new(EventType::Stock, EventAction::UpdateDec);
        assert_ne!(a.lookup(&pair), a.lookup(&other));
    }

    #[test]
    fn missing_pairs_are_reported() {
        let removed = EventPair::new(EventType::Listing, EventAction::Create);
        let taxonomy = EventTaxonomy::from_entries(
            EventTaxonomy::standard()
                .keys
                .into_iter()
                .filter(|(p, _)| *p != removed),
        );
        assert_eq!(taxonomy.missing_pairs(), vec![removed]);
        assert!(taxonomy.lookup(&removed).is_none());
    }
}
