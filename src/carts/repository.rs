use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::carts::store::{CartStore, StatisticsRow, StoreError};
use crate::carts::{Cart, CartItem, CartStatus, Coupon, MERGED_AT_KEY, MERGED_TO_KEY};

/// Row shape of the `carts` table
#[derive(Debug, FromRow)]
struct CartRow {
    id: Uuid,
    owner_id: Option<String>,
    status: String,
    items: Json<Vec<CartItem>>,
    coupon: Option<Json<Coupon>>,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    total_amount: Decimal,
    metadata: Json<HashMap<String, String>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = StoreError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<CartStatus>()
            .map_err(|e| StoreError::Corrupt(format!("cart {}: {}", row.id, e)))?;

        Ok(Cart {
            id: row.id,
            owner_id: row.owner_id,
            status,
            items: row.items.0,
            coupon: row.coupon.map(|coupon| coupon.0),
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            tax_amount: row.tax_amount,
            shipping_cost: row.shipping_cost,
            total_amount: row.total_amount,
            metadata: row.metadata.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatisticsRecord {
    total_carts: i64,
    active_carts: i64,
    abandoned_carts: i64,
    processing_carts: i64,
    completed_carts: i64,
    total_value: Decimal,
}

/// Cart store backed by a single Postgres table with JSONB line items
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    /// Create a new PgCartStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn insert(&self, cart: &Cart) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO carts (
                id, owner_id, status, items, coupon, subtotal, discount_amount, tax_amount,
                shipping_cost, total_amount, metadata, version, created_at, updated_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#
        )
        .bind(cart.id)
        .bind(cart.owner_id.as_deref())
        .bind(cart.status.as_str())
        .bind(Json(&cart.items))
        .bind(cart.coupon.as_ref().map(Json))
        .bind(cart.subtotal)
        .bind(cart.discount_amount)
        .bind(cart.tax_amount)
        .bind(cart.shipping_cost)
        .bind(cart.total_amount)
        .bind(Json(&cart.metadata))
        .bind(cart.version)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .bind(cart.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, StoreError> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, owner_id, status, items, coupon, subtotal, discount_amount, tax_amount,
                   shipping_cost, total_amount, metadata, version, created_at, updated_at, expires_at
            FROM carts
            WHERE id = $1
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Cart::try_from).transpose()
    }

    async fn find_active_by_owner(&self, owner_id: &str) -> Result<Option<Cart>, StoreError> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, owner_id, status, items, coupon, subtotal, discount_amount, tax_amount,
                   shipping_cost, total_amount, metadata, version, created_at, updated_at, expires_at
            FROM carts
            WHERE owner_id = $1 AND status = 'active'
            ORDER BY updated_at DESC
            LIMIT 1
            "#
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Cart::try_from).transpose()
    }

    async fn replace_if_version(&self, cart: &Cart, expected_version: i64) -> Result<Option<Cart>, StoreError> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            UPDATE carts
            SET owner_id = $2, status = $3, items = $4, coupon = $5, subtotal = $6,
                discount_amount = $7, tax_amount = $8, shipping_cost = $9, total_amount = $10,
                metadata = $11, updated_at = $12, expires_at = $13, version = version + 1
            WHERE id = $1 AND version = $14
            RETURNING id, owner_id, status, items, coupon, subtotal, discount_amount, tax_amount,
                      shipping_cost, total_amount, metadata, version, created_at, updated_at, expires_at
            "#
        )
        .bind(cart.id)
        .bind(cart.owner_id.as_deref())
        .bind(cart.status.as_str())
        .bind(Json(&cart.items))
        .bind(cart.coupon.as_ref().map(Json))
        .bind(cart.subtotal)
        .bind(cart.discount_amount)
        .bind(cart.tax_amount)
        .bind(cart.shipping_cost)
        .bind(cart.total_amount)
        .bind(Json(&cart.metadata))
        .bind(cart.updated_at)
        .bind(cart.expires_at)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Cart::try_from).transpose()
    }

    async fn retire_merged(
        &self,
        source_id: Uuid,
        expected_version: i64,
        target_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE carts
            SET status = 'completed',
                metadata = metadata || jsonb_build_object($2::text, $3::text, $4::text, $5::text),
                updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $7 AND status IN ('active', 'abandoned')
            "#
        )
        .bind(source_id)
        .bind(MERGED_TO_KEY)
        .bind(target_id.to_string())
        .bind(MERGED_AT_KEY)
        .bind(at.to_rfc3339())
        .bind(at)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE carts
            SET status = 'abandoned', version = version + 1
            WHERE status = 'active' AND updated_at < $1
            "#
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn aggregate_statistics(&self, since: DateTime<Utc>) -> Result<StatisticsRow, StoreError> {
        let record = sqlx::query_as::<_, StatisticsRecord>(
            r#"
            SELECT
                COUNT(*) AS total_carts,
                COUNT(*) FILTER (WHERE status = 'active') AS active_carts,
                COUNT(*) FILTER (WHERE status = 'abandoned') AS abandoned_carts,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing_carts,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_carts,
                COALESCE(SUM(total_amount), 0) AS total_value
            FROM carts
            WHERE created_at >= $1
            "#
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(StatisticsRow {
            total_carts: record.total_carts,
            active_carts: record.active_carts,
            abandoned_carts: record.abandoned_carts,
            processing_carts: record.processing_carts,
            completed_carts: record.completed_carts,
            total_value: record.total_value,
        })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM carts WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
