//! Business rules applied to each requested order line.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{clients::catalog::CatalogSnapshot, dto::orders::OrderLineRequest};

/// A line priced from its catalog snapshot. The price is never re-read later.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLineItem {
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl ValidatedLineItem {
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LineRejection {
    #[error("Quantity must be greater than 0")]
    NonPositiveQuantity { product_id: i32, quantity: i32 },

    #[error("Insufficient stock for product {name}. Available: {available}")]
    InsufficientStock {
        product_id: i32,
        name: String,
        available: i32,
        requested: i32,
    },

    #[error("Order total exceeds the supported amount")]
    TotalOverflow,
}

/// Shape check that needs no catalog data.
pub fn check_quantity(line: &OrderLineRequest) -> Result<(), LineRejection> {
    if line.quantity <= 0 {
        return Err(LineRejection::NonPositiveQuantity {
            product_id: line.product_id,
            quantity: line.quantity,
        });
    }
    Ok(())
}

pub fn validate_line(
    line: &OrderLineRequest,
    snapshot: &CatalogSnapshot,
) -> Result<ValidatedLineItem, LineRejection> {
    check_quantity(line)?;
    if snapshot.available_stock < line.quantity {
        return Err(LineRejection::InsufficientStock {
            product_id: line.product_id,
            name: snapshot.name.clone(),
            available: snapshot.available_stock,
            requested: line.quantity,
        });
    }

    Ok(ValidatedLineItem {
        product_id: line.product_id,
        quantity: line.quantity,
        unit_price: snapshot.unit_price,
    })
}

/// Largest amount a `NUMERIC(12,2)` column holds.
pub const MAX_ORDER_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Sum of `unit_price * quantity`, accumulated in submission order.
pub fn order_total(lines: &[ValidatedLineItem]) -> Result<Decimal, LineRejection> {
    lines.iter().try_fold(Decimal::ZERO, |total, line| {
        line.line_total()
            .and_then(|line_total| total.checked_add(line_total))
            .filter(|total| *total <= MAX_ORDER_AMOUNT)
            .ok_or(LineRejection::TotalOverflow)
    })
}
