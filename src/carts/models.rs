use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::carts::pricing::CartTotals;
use crate::validation::{validate_non_blank, validate_positive_price};

/// Metadata key written on a guest cart once it has been merged into another cart
pub const MERGED_TO_KEY: &str = "mergedTo";

/// Metadata key holding the time a guest cart was merged
pub const MERGED_AT_KEY: &str = "mergedAt";

/// Cart status enum representing the lifecycle of a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Active,
    Abandoned,
    Processing,
    Completed,
}

impl CartStatus {
    /// Convert status to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Processing => "processing",
            CartStatus::Completed => "completed",
        }
    }
}

impl Default for CartStatus {
    fn default() -> Self {
        CartStatus::Active
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CartStatus::Active),
            "abandoned" => Ok(CartStatus::Abandoned),
            "processing" => Ok(CartStatus::Processing),
            "completed" => Ok(CartStatus::Completed),
            _ => Err(format!("Invalid cart status: {}", s)),
        }
    }
}

/// How a coupon's `discount_value` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` percent of the subtotal (10 = 10% off)
    Percentage,
    /// `discount_value` subtracted from the subtotal
    Fixed,
}

/// A discount applied to a cart. At most one per cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub applied_at: DateTime<Utc>,
}

/// A product line inside a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unit price captured when the line was first added
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Build a fresh line from an add request
    pub fn from_request(request: AddItemRequest, added_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: request.product_id,
            title: request.title,
            description: request.description,
            price: request.price,
            quantity: request.quantity,
            weight: request.weight,
            image: request.image,
            metadata: request.metadata,
            added_at,
        }
    }

    /// Unit price times quantity, `None` when it does not fit
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Shopping cart aggregate.
///
/// The monetary fields are derived: they are only ever written through
/// [`Cart::apply_totals`] or [`Cart::zero_totals`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: Uuid,
    /// Absent for guest carts
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub status: CartStatus,
    pub items: Vec<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Bumped by every store write; used for conditional updates
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    /// A new, empty, active cart expiring `ttl` from `now`
    pub fn new(
        owner_id: Option<String>,
        metadata: HashMap<String, String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            status: CartStatus::Active,
            items: Vec::new(),
            coupon: None,
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            metadata,
            version: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.owner_id.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Expiry is enforced at read time, before the store removes the record
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn item_count(&self) -> i32 {
        self.items
            .iter()
            .fold(0i32, |count, item| count.saturating_add(item.quantity))
    }

    pub fn find_item(&self, item_id: Uuid) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn find_item_mut(&mut self, item_id: Uuid) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    /// Subtotal after the coupon has been taken off
    pub fn discounted_subtotal(&self) -> Decimal {
        self.subtotal - self.discount_amount
    }

    pub fn apply_totals(&mut self, totals: CartTotals) {
        self.subtotal = totals.subtotal;
        self.discount_amount = totals.discount_amount;
        self.tax_amount = totals.tax_amount;
        self.shipping_cost = totals.shipping_cost;
        self.total_amount = totals.total_amount;
    }

    pub fn zero_totals(&mut self) {
        self.apply_totals(CartTotals::zero());
    }

    /// Stamp a mutation at `now`; `ttl` renews the expiry horizon when given
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Option<Duration>) {
        self.updated_at = now;
        if let Some(ttl) = ttl {
            self.expires_at = now + ttl;
        }
    }

    pub fn summary(&self) -> CartSummary {
        CartSummary {
            id: self.id,
            item_count: self.item_count(),
            total_amount: self.total_amount,
            status: self.status,
        }
    }
}

/// Request DTO for creating a cart
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCartRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Request DTO for adding a product line
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    #[validate(custom = "validate_non_blank")]
    pub product_id: String,
    #[validate(custom = "validate_non_blank")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(custom = "validate_positive_price")]
    pub price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Request DTO for changing a line's quantity.
/// Not range-validated here: non-positive quantities are rejected by the service.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// Request DTO for applying a coupon
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    pub code: String,
}

/// Request DTO for merging a guest cart into the caller's cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartRequest {
    pub guest_cart_id: Uuid,
}

/// Compact view of a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub id: Uuid,
    pub item_count: i32,
    pub total_amount: Decimal,
    pub status: CartStatus,
}

/// Cart analytics over a lookback window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartStatistics {
    pub total_carts: i64,
    pub active_carts: i64,
    pub abandoned_carts: i64,
    pub processing_carts: i64,
    pub completed_carts: i64,
    pub average_cart_value: Decimal,
}
