use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

pub const DELIVERY_DESCRIPTION: &str = "Delivery";

/// One invoice row. `amount` is always `billed_units * unit_price` rounded to
/// two decimals; `quantity` is the pack count shown on the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub billed_units: u32,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

impl LineItem {
    pub fn delivery(amount: Decimal) -> Self {
        Self {
            description: DELIVERY_DESCRIPTION.to_string(),
            product_id: None,
            quantity: 1,
            billed_units: 1,
            unit_price: amount,
            amount,
        }
    }

    pub fn is_delivery(&self) -> bool {
        self.product_id.is_none()
    }
}

/// Result of a target-sum allocation: product rows in selection order followed
/// by the capped delivery remainder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub target: Decimal,
    pub products: Vec<LineItem>,
    pub delivery: LineItem,
    /// Number of catalog products that survived name resolution.
    pub working_set_size: usize,
    /// How many phase-one draws were attempted.
    pub seed_attempts: u32,
}

impl Allocation {
    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.products.iter().chain(std::iter::once(&self.delivery))
    }

    pub fn product_total(&self) -> Decimal {
        self.products.iter().map(|line| line.amount).sum()
    }

    pub fn total(&self) -> Decimal {
        self.product_total() + self.delivery.amount
    }

    pub fn shortfall(&self) -> Decimal {
        (self.target - self.total()).max(Decimal::ZERO)
    }

    /// True when no catalog product was eligible, so the allocation can only
    /// carry the delivery row. Callers treat this as "nothing matched".
    pub fn is_unmatched(&self) -> bool {
        self.working_set_size == 0
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::product::ProductId;

    use super::{Allocation, LineItem, DELIVERY_DESCRIPTION};

    fn product_line(amount: i64) -> LineItem {
        LineItem {
            description: "Elf Bar 600 - Cola".to_string(),
            product_id: Some(ProductId::new("Elf Bar 600", "Cola")),
            quantity: 10,
            billed_units: 10,
            unit_price: Decimal::new(amount, 3),
            amount: Decimal::new(amount, 2),
        }
    }

    #[test]
    fn delivery_line_is_a_single_unit_at_its_amount() {
        let line = LineItem::delivery(Decimal::new(1250, 2));

        assert!(line.is_delivery());
        assert_eq!(line.description, DELIVERY_DESCRIPTION);
        assert_eq!(line.quantity, 1);
        assert_eq!(line.unit_price, line.amount);
    }

    #[test]
    fn totals_include_delivery_and_report_shortfall() {
        let allocation = Allocation {
            target: Decimal::new(20000, 2),
            products: vec![product_line(5000), product_line(7500)],
            delivery: LineItem::delivery(Decimal::new(3000, 2)),
            working_set_size: 4,
            seed_attempts: 9,
        };

        assert_eq!(allocation.product_total(), Decimal::new(12500, 2));
        assert_eq!(allocation.total(), Decimal::new(15500, 2));
        assert_eq!(allocation.shortfall(), Decimal::new(4500, 2));
        assert_eq!(allocation.line_items().count(), 3);
        assert!(!allocation.is_unmatched());
    }

    #[test]
    fn empty_working_set_is_reported_as_unmatched() {
        let allocation = Allocation {
            target: Decimal::new(50, 0),
            products: Vec::new(),
            delivery: LineItem::delivery(Decimal::new(30, 0)),
            working_set_size: 0,
            seed_attempts: 7,
        };

        assert!(allocation.is_unmatched());
        assert_eq!(allocation.total(), Decimal::new(30, 0));
    }
}
