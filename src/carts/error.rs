use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::carts::availability::AvailabilityError;
use crate::carts::coupon::CouponError;
use crate::carts::pricing::AmountOverflow;
use crate::carts::store::StoreError;
use crate::error::ErrorResponse;

/// Error types for cart operations
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Cart {0} not found")]
    NotFound(Uuid),

    #[error("No active cart for user {0}")]
    OwnerCartNotFound(String),

    #[error("Cart {0} has expired")]
    Expired(Uuid),

    #[error("Item {0} not in cart")]
    ItemNotFound(Uuid),

    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(i64),

    #[error("Product {product_id} not available or insufficient stock")]
    ProductUnavailable { product_id: String },

    #[error("Coupon not valid: {0}")]
    CouponInvalid(String),

    #[error("Cart {0} is empty")]
    CartEmpty(Uuid),

    #[error("Cart {id} cannot be changed while {status}")]
    InvalidState { id: Uuid, status: String },

    #[error("Cart {0} was modified concurrently, retry the request")]
    ConcurrentModification(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body failed field validation
    #[error("Validation error: {0}")]
    InvalidFields(validator::ValidationErrors),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CartError {
    /// Machine-readable code carried in error bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            CartError::NotFound(_) | CartError::OwnerCartNotFound(_) => "CART_NOT_FOUND",
            CartError::Expired(_) => "CART_EXPIRED",
            CartError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            CartError::InvalidQuantity(_) => "INVALID_QUANTITY",
            CartError::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            CartError::CouponInvalid(_) => "COUPON_INVALID",
            CartError::CartEmpty(_) => "CART_EMPTY",
            CartError::InvalidState { .. } => "INVALID_CART_STATE",
            CartError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            CartError::Validation(_) | CartError::InvalidFields(_) => "VALIDATION_ERROR",
            CartError::Forbidden(_) => "FORBIDDEN",
            CartError::Transport(_) => "TRANSPORT_ERROR",
            CartError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CartError::NotFound(_) | CartError::OwnerCartNotFound(_) | CartError::ItemNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CartError::Expired(_) => StatusCode::GONE,
            CartError::InvalidQuantity(_)
            | CartError::CouponInvalid(_)
            | CartError::CartEmpty(_)
            | CartError::Validation(_)
            | CartError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            CartError::ProductUnavailable { .. }
            | CartError::InvalidState { .. }
            | CartError::ConcurrentModification(_) => StatusCode::CONFLICT,
            CartError::Forbidden(_) => StatusCode::FORBIDDEN,
            CartError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            CartError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transport failures may succeed on retry; everything else is a firm answer
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CartError::Transport(_) | CartError::ConcurrentModification(_)
        )
    }
}

impl From<StoreError> for CartError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt(msg) => CartError::Internal(msg),
            other => CartError::Transport(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for CartError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::Unavailable { product_id, .. } => {
                CartError::ProductUnavailable { product_id }
            }
            AvailabilityError::Transport(msg) => CartError::Transport(msg),
        }
    }
}

impl From<CouponError> for CartError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::Invalid(code) => CartError::CouponInvalid(code),
            CouponError::Transport(msg) => CartError::Transport(msg),
        }
    }
}

impl From<validator::ValidationErrors> for CartError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CartError::InvalidFields(errors)
    }
}

impl From<AmountOverflow> for CartError {
    fn from(err: AmountOverflow) -> Self {
        CartError::Validation(err.to_string())
    }
}

impl IntoResponse for CartError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            CartError::Transport(msg) => {
                error!("Transport error: {}", msg);
                "A dependency is temporarily unavailable".to_string()
            }
            CartError::Internal(msg) => {
                error!("Internal error: {}", msg);
                "An internal server error occurred".to_string()
            }
            CartError::Forbidden(msg) => {
                warn!("Forbidden cart access: {}", msg);
                "Not authorized to access this cart".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse::new(self.error_code(), message);
        let body = match &self {
            CartError::InvalidFields(errors) => body.with_details(
                serde_json::to_value(errors).unwrap_or_else(|_| serde_json::json!({})),
            ),
            _ => body,
        };
        body.into_response_with(status)
    }
}
