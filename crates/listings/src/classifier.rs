//! Change classification.
//!
//! `RuleChain::classify` maps the current listing state and its previous
//! snapshot to exactly one `(event_type, event_action)` pair. Rules are
//! evaluated strictly in chain order and the first match wins, so the order of
//! the chain is part of the observable behavior.
//!
//! Under the standard order, stock and price rules run before the
//! no-prior-record rule: a first observation with non-zero stock is reported
//! as a stock increase, not a creation. `RuleChain::create_first` is the
//! alternative ordering for consumers that want creation to dominate.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use listing_facts_core::DomainError;

use crate::snapshot::PreviousSnapshot;

/// Declared event types of the event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "listing")]
    Listing,
    #[serde(rename = "order")]
    Order,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "price-sales")]
    PriceSales,
    #[serde(rename = "stock")]
    Stock,
    #[serde(rename = "erp_stock")]
    ErpStock,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Listing,
        EventType::Order,
        EventType::Price,
        EventType::PriceSales,
        EventType::Stock,
        EventType::ErpStock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Listing => "listing",
            EventType::Order => "order",
            EventType::Price => "price",
            EventType::PriceSales => "price-sales",
            EventType::Stock => "stock",
            EventType::ErpStock => "erp_stock",
        }
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown event type: {s}")))
    }
}

/// Declared event actions of the event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventAction {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "update-inc")]
    UpdateInc,
    #[serde(rename = "update-dec")]
    UpdateDec,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "published")]
    Published,
    #[serde(rename = "unpublished")]
    Unpublished,
}

impl EventAction {
    pub const ALL: [EventAction; 6] = [
        EventAction::Create,
        EventAction::UpdateInc,
        EventAction::UpdateDec,
        EventAction::Delete,
        EventAction::Published,
        EventAction::Unpublished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::UpdateInc => "update-inc",
            EventAction::UpdateDec => "update-dec",
            EventAction::Delete => "delete",
            EventAction::Published => "published",
            EventAction::Unpublished => "unpublished",
        }
    }
}

impl FromStr for EventAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown event action: {s}")))
    }
}

/// One classified `(event_type, event_action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventPair {
    pub event_type: EventType,
    pub event_action: EventAction,
}

impl EventPair {
    /// What an exhausted rule chain yields.
    pub const FALLBACK: EventPair = EventPair::new(EventType::Listing, EventAction::Unpublished);

    pub const fn new(event_type: EventType, event_action: EventAction) -> Self {
        Self {
            event_type,
            event_action,
        }
    }

    /// Full declared cross product (6 types × 6 actions).
    pub fn declared() -> Vec<EventPair> {
        EventType::ALL
            .into_iter()
            .flat_map(|t| EventAction::ALL.into_iter().map(move |a| EventPair::new(t, a)))
            .collect()
    }
}

impl core::fmt::Display for EventPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.event_type.as_str(), self.event_action.as_str())
    }
}

/// Current comparison attributes of a listing, with aggregates already defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentState {
    pub stock_quantity: i64,
    pub price_minor: i64,
    pub is_approved: bool,
    pub is_published: bool,
}

impl CurrentState {
    pub fn is_active(&self) -> bool {
        self.is_approved && self.is_published
    }
}

/// A single named rule of the classification chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationRule {
    StockIncreased,
    StockDecreased,
    PriceIncreased,
    PriceDecreased,
    BecameActive,
    BecameInactive,
    NoPriorRecord,
    CurrentlyActive,
    /// Always matches.
    Fallback,
}

impl ClassificationRule {
    pub fn name(&self) -> &'static str {
        match self {
            ClassificationRule::StockIncreased => "stock_increased",
            ClassificationRule::StockDecreased => "stock_decreased",
            ClassificationRule::PriceIncreased => "price_increased",
            ClassificationRule::PriceDecreased => "price_decreased",
            ClassificationRule::BecameActive => "became_active",
            ClassificationRule::BecameInactive => "became_inactive",
            ClassificationRule::NoPriorRecord => "no_prior_record",
            ClassificationRule::CurrentlyActive => "currently_active",
            ClassificationRule::Fallback => "fallback",
        }
    }

    /// Evaluate this rule alone; `None` when its condition does not hold.
    pub fn evaluate(&self, current: &CurrentState, previous: &PreviousSnapshot) -> Option<EventPair> {
        use EventAction::*;
        use EventType::*;

        let matched = match self {
            ClassificationRule::StockIncreased => {
                (current.stock_quantity > previous.stock_quantity).then_some((Stock, UpdateInc))
            }
            ClassificationRule::StockDecreased => {
                (current.stock_quantity < previous.stock_quantity).then_some((Stock, UpdateDec))
            }
            ClassificationRule::PriceIncreased => {
                (current.price_minor > previous.price_minor).then_some((Price, UpdateInc))
            }
            ClassificationRule::PriceDecreased => {
                (current.price_minor < previous.price_minor).then_some((Price, UpdateDec))
            }
            ClassificationRule::BecameActive => {
                (current.is_active() && !previous.was_active()).then_some((Listing, Published))
            }
            ClassificationRule::BecameInactive => {
                (previous.was_active() && !current.is_active()).then_some((Listing, Unpublished))
            }
            ClassificationRule::NoPriorRecord => (!previous.has_prior).then_some((Listing, Create)),
            ClassificationRule::CurrentlyActive => {
                current.is_active().then_some((Listing, Published))
            }
            ClassificationRule::Fallback => Some((Listing, Unpublished)),
        };

        matched.map(|(t, a)| EventPair::new(t, a))
    }
}

/// Named, selectable rule orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleOrder {
    /// Stock, price, activation, creation, then current flags.
    #[default]
    Standard,
    /// Creation is checked before everything else.
    CreateFirst,
}

impl RuleOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleOrder::Standard => "standard",
            RuleOrder::CreateFirst => "create-first",
        }
    }
}

impl FromStr for RuleOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(RuleOrder::Standard),
            "create-first" | "create_first" => Ok(RuleOrder::CreateFirst),
            other => Err(DomainError::validation(format!("unknown rule order: {other}"))),
        }
    }
}

/// Ordered classification rules; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChain {
    rules: Vec<ClassificationRule>,
}

impl RuleChain {
    /// Build a chain from an explicit order. If no rule matches, the result is
    /// the `Fallback` pair.
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn standard() -> Self {
        use ClassificationRule::*;
        Self::new(vec![
            StockIncreased,
            StockDecreased,
            PriceIncreased,
            PriceDecreased,
            BecameActive,
            BecameInactive,
            NoPriorRecord,
            CurrentlyActive,
            Fallback,
        ])
    }

    pub fn create_first() -> Self {
        use ClassificationRule::*;
        Self::new(vec![
            NoPriorRecord,
            StockIncreased,
            StockDecreased,
            PriceIncreased,
            PriceDecreased,
            BecameActive,
            BecameInactive,
            CurrentlyActive,
            Fallback,
        ])
    }

    pub fn from_order(order: RuleOrder) -> Self {
        match order {
            RuleOrder::Standard => Self::standard(),
            RuleOrder::CreateFirst => Self::create_first(),
        }
    }

    /// Classify and also report which rule decided.
    pub fn classify_with_rule(
        &self,
        current: &CurrentState,
        previous: &PreviousSnapshot,
    ) -> (EventPair, ClassificationRule) {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(current, previous).map(|pair| (pair, *rule)))
            .unwrap_or((EventPair::FALLBACK, ClassificationRule::Fallback))
    }

    pub fn classify(&self, current: &CurrentState, previous: &PreviousSnapshot) -> EventPair {
        self.classify_with_rule(current, previous).0
    }
}

impl Default for RuleChain {
    fn default() -> Self {
        Self::standard()
    }
}
