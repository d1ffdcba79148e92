use rust_decimal::Decimal;

use crate::carts::{CartItem, Coupon, DiscountType};

/// Derived monetary fields of a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTotals {
    /// Sum of line totals before any discount
    pub subtotal: Decimal,
    /// Amount taken off by the coupon, after clamping
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
}

impl CartTotals {
    pub fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            total_amount: Decimal::ZERO,
        }
    }

    pub fn discounted_subtotal(&self) -> Decimal {
        self.subtotal - self.discount_amount
    }
}

/// A derived amount does not fit in a `Decimal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cart amount is out of range")]
pub struct AmountOverflow;

/// Pure recomputation of cart totals.
///
/// Order is fixed: subtotal, coupon, clamp at zero, tax on the discounted
/// value, shipping, total. Every step is checked; an overflow anywhere fails
/// the whole recomputation instead of storing a wrapped or partial total.
pub struct PricingEngine;

impl PricingEngine {
    /// Recompute every derived monetary field from the item list and coupon
    ///
    /// # Arguments
    /// * `items` - Current cart lines
    /// * `coupon` - Applied coupon, if any
    /// * `tax_rate` - Fraction applied to the discounted subtotal (0.18 = 18%)
    /// * `shipping_cost` - Flat shipping added after tax
    pub fn recompute(
        items: &[CartItem],
        coupon: Option<&Coupon>,
        tax_rate: Decimal,
        shipping_cost: Decimal,
    ) -> Result<CartTotals, AmountOverflow> {
        let subtotal = Self::calculate_subtotal(items)?;
        let discounted = Self::apply_coupon(subtotal, coupon)?;
        let tax_amount = discounted.checked_mul(tax_rate).ok_or(AmountOverflow)?;
        let total_amount = discounted
            .checked_add(tax_amount)
            .and_then(|amount| amount.checked_add(shipping_cost))
            .ok_or(AmountOverflow)?;

        Ok(CartTotals {
            subtotal,
            discount_amount: subtotal.checked_sub(discounted).ok_or(AmountOverflow)?,
            tax_amount,
            shipping_cost,
            total_amount,
        })
    }

    /// Sum of `price * quantity` over all lines
    pub fn calculate_subtotal(items: &[CartItem]) -> Result<Decimal, AmountOverflow> {
        items.iter().try_fold(Decimal::ZERO, |sum, item| {
            item.line_total()
                .and_then(|line| sum.checked_add(line))
                .ok_or(AmountOverflow)
        })
    }

    /// Subtotal after the coupon, never below zero
    pub fn apply_coupon(subtotal: Decimal, coupon: Option<&Coupon>) -> Result<Decimal, AmountOverflow> {
        let discounted = match coupon {
            None => Some(subtotal),
            Some(coupon) => match coupon.discount_type {
                DiscountType::Percentage => subtotal
                    .checked_mul(coupon.discount_value)
                    .and_then(|off| off.checked_div(Decimal::ONE_HUNDRED))
                    .and_then(|off| subtotal.checked_sub(off)),
                DiscountType::Fixed => subtotal.checked_sub(coupon.discount_value),
            },
        };
        discounted
            .map(|amount| amount.max(Decimal::ZERO))
            .ok_or(AmountOverflow)
    }
}
