use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Catalog identity of a sellable product: the product name plus its variant
/// (flavour, colour, strength...). Two products are the same entry only when
/// both parts match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId {
    pub name: String,
    pub variant: String,
}

impl ProductId {
    pub fn new(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self { name: name.into(), variant: variant.into() }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.variant)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Unit price used when no quantity tier applies.
    pub base_price: Decimal,
    /// Unit price keyed by the underlying-unit quantity at which it starts.
    pub tiers: BTreeMap<u32, Decimal>,
}

impl Product {
    pub fn new(name: impl Into<String>, variant: impl Into<String>, base_price: Decimal) -> Self {
        Self { id: ProductId::new(name, variant), base_price, tiers: BTreeMap::new() }
    }

    pub fn with_tier(mut self, quantity: u32, unit_price: Decimal) -> Self {
        self.tiers.insert(quantity, unit_price);
        self
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn largest_tier(&self) -> Option<u32> {
        self.tiers.keys().next_back().copied()
    }

    /// Returns the first tier (in ascending quantity order) whose price is
    /// higher than the price that applies just below it, base price included.
    pub fn first_price_increase(&self) -> Option<(u32, Decimal, Decimal)> {
        let mut previous = self.base_price;
        for (quantity, price) in &self.tiers {
            if *price > previous {
                return Some((*quantity, previous, *price));
            }
            previous = *price;
        }
        None
    }
}
