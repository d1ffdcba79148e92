// Product availability oracle
//
// The cart never owns stock; it asks the product service whether a quantity
// can be sold before accepting it into a cart line.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Why a product could not be confirmed
#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Product {product_id} cannot supply {requested} units")]
    Unavailable { product_id: String, requested: i32 },

    #[error("Product service unreachable: {0}")]
    Transport(String),
}

/// Answers whether a product can be sold in a given quantity
#[async_trait]
pub trait ProductAvailability: Send + Sync {
    async fn check_availability(&self, product_id: &str, quantity: i32) -> Result<(), AvailabilityError>;
}

/// Product as returned by the product service
#[derive(Debug, Deserialize)]
struct ProductStock {
    stock: i64,
}

/// HTTP client for the product service
#[derive(Clone)]
pub struct HttpProductClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpProductClient {
    /// Create a client whose every call is bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AvailabilityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AvailabilityError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn product_url(&self, product_id: &str) -> String {
        format!("{}/products/{}", self.base_url, product_id)
    }
}

#[async_trait]
impl ProductAvailability for HttpProductClient {
    async fn check_availability(&self, product_id: &str, quantity: i32) -> Result<(), AvailabilityError> {
        let url = self.product_url(product_id);
        tracing::debug!("Checking availability of {} x{} at {}", product_id, quantity, url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AvailabilityError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(AvailabilityError::Unavailable {
                    product_id: product_id.to_string(),
                    requested: quantity,
                })
            }
            other => {
                return Err(AvailabilityError::Transport(format!(
                    "unexpected status code from product service: {}",
                    other
                )))
            }
        }

        let product: ProductStock = response
            .json()
            .await
            .map_err(|e| AvailabilityError::Transport(e.to_string()))?;

        if product.stock < i64::from(quantity) {
            return Err(AvailabilityError::Unavailable {
                product_id: product_id.to_string(),
                requested: quantity,
            });
        }

        Ok(())
    }
}

/// In-process stock table. Unknown products are unavailable.
#[derive(Debug, Default)]
pub struct StockTable {
    stock: RwLock<HashMap<String, i64>>,
}

impl StockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the available stock for a product
    pub fn set_stock(&self, product_id: impl Into<String>, stock: i64) {
        // Single-key inserts never leave the map half-written
        let mut table = self.stock.write().unwrap_or_else(PoisonError::into_inner);
        table.insert(product_id.into(), stock);
    }

    pub fn with_stock(self, product_id: impl Into<String>, stock: i64) -> Self {
        self.set_stock(product_id, stock);
        self
    }
}

#[async_trait]
impl ProductAvailability for StockTable {
    async fn check_availability(&self, product_id: &str, quantity: i32) -> Result<(), AvailabilityError> {
        let table = self.stock.read().unwrap_or_else(PoisonError::into_inner);

        match table.get(product_id) {
            Some(stock) if *stock >= i64::from(quantity) => Ok(()),
            _ => Err(AvailabilityError::Unavailable {
                product_id: product_id.to_string(),
                requested: quantity,
            }),
        }
    }
}
