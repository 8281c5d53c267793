//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

/// A price in the smallest currency unit (e.g. cents) with an optional ISO
/// currency code.
///
/// Change detection compares `amount_minor` only; a currency switch at the same
/// amount is not a price event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Option<String>,
}

impl Money {
    pub fn new(amount_minor: i64, currency: impl Into<String>) -> Self {
        Self {
            amount_minor,
            currency: Some(currency.into()),
        }
    }

    /// Defaulted price used when no price record exists.
    pub fn zero() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_default_without_currency() {
        assert_eq!(Money::zero(), Money { amount_minor: 0, currency: None });
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(Money::new(1000, "USD"), Money::new(1000, "USD"));
        assert_ne!(Money::new(1000, "USD"), Money::new(1000, "EUR"));
    }
}
