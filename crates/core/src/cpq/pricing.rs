use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::product::Product;

pub const MONEY_DECIMALS: u32 = 2;

/// Which catalog entry produced a unit price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "quantity", rename_all = "snake_case")]
pub enum TierMatch {
    Exact(u32),
    Below(u32),
    Largest(u32),
    Base,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPrice {
    pub unit_price: Decimal,
    pub tier: TierMatch,
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds toward zero at money precision, so the result never exceeds `value`.
pub fn truncate_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMALS, RoundingStrategy::ToZero)
}

pub fn line_cost(unit_price: Decimal, units: u32) -> Decimal {
    unit_price * Decimal::from(units)
}

/// Price used when a product is first placed on an allocation: the unit price
/// of its largest tier, or the base price for untiered products.
pub fn seed_price(product: &Product) -> TierPrice {
    match product.tiers.iter().next_back() {
        Some((quantity, price)) => {
            TierPrice { unit_price: *price, tier: TierMatch::Largest(*quantity) }
        }
        None => TierPrice { unit_price: product.base_price, tier: TierMatch::Base },
    }
}

/// Price for exactly `quantity` underlying units: the tier keyed at that
/// quantity, else the highest tier strictly below it, else the base price.
pub fn price_at(product: &Product, quantity: u32) -> TierPrice {
    if let Some(price) = product.tiers.get(&quantity) {
        return TierPrice { unit_price: *price, tier: TierMatch::Exact(quantity) };
    }

    match product.tiers.range(..quantity).next_back() {
        Some((tier, price)) => TierPrice { unit_price: *price, tier: TierMatch::Below(*tier) },
        None => TierPrice { unit_price: product.base_price, tier: TierMatch::Base },
    }
}
