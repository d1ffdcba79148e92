use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::carts::{Coupon, DiscountType};

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("{0}")]
    Invalid(String),

    #[error("Coupon catalog unreachable: {0}")]
    Transport(String),
}

/// Turns a submitted code into the coupon that gets attached to a cart
#[async_trait]
pub trait CouponResolver: Send + Sync {
    async fn resolve(&self, code: &str, applied_at: DateTime<Utc>) -> Result<Coupon, CouponError>;
}

/// Stand-in catalog: every non-blank code is worth the same percentage.
#[derive(Debug, Clone)]
pub struct FlatPercentageCoupons {
    percent: Decimal,
}

impl FlatPercentageCoupons {
    pub fn new(percent: Decimal) -> Self {
        Self { percent }
    }
}

impl Default for FlatPercentageCoupons {
    fn default() -> Self {
        Self::new(Decimal::TEN)
    }
}

#[async_trait]
impl CouponResolver for FlatPercentageCoupons {
    async fn resolve(&self, code: &str, applied_at: DateTime<Utc>) -> Result<Coupon, CouponError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CouponError::Invalid("coupon code is blank".to_string()));
        }

        Ok(Coupon {
            code: code.to_uppercase(),
            discount_type: DiscountType::Percentage,
            discount_value: self.percent,
            applied_at,
        })
    }
}
