use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::carts::store::CartStore;
use crate::carts::{CartError, CartStatistics};

/// Lookback window accepted by the statistics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatsRange {
    #[default]
    Day,
    Week,
    Month,
}

impl StatsRange {
    pub fn window(&self) -> Duration {
        match self {
            StatsRange::Day => Duration::hours(24),
            StatsRange::Week => Duration::days(7),
            StatsRange::Month => Duration::days(30),
        }
    }
}

impl std::str::FromStr for StatsRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(StatsRange::Day),
            "week" => Ok(StatsRange::Week),
            "month" => Ok(StatsRange::Month),
            _ => Err(format!("Invalid statistics range: {}", s)),
        }
    }
}

/// Read-only cart analytics
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: Arc<dyn CartStore>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn CartStore>) -> Self {
        Self { store }
    }

    /// Counts and average total of carts created within `window` of now
    pub async fn collect(&self, window: Duration) -> Result<CartStatistics, CartError> {
        let since = Utc::now() - window;
        tracing::debug!("Aggregating cart statistics since {}", since);

        let row = self.store.aggregate_statistics(since).await?;

        let average_cart_value = if row.total_carts > 0 {
            row.total_value / Decimal::from(row.total_carts)
        } else {
            Decimal::ZERO
        };

        Ok(CartStatistics {
            total_carts: row.total_carts,
            active_carts: row.active_carts,
            abandoned_carts: row.abandoned_carts,
            processing_carts: row.processing_carts,
            completed_carts: row.completed_carts,
            average_cart_value,
        })
    }
}
