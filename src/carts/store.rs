// Cart persistence port
//
// The capability set the lifecycle manager needs from a document store:
// single-document reads, conditional atomic replace, one bulk status update,
// a windowed aggregation and physical removal of expired documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::carts::{Cart, CartStatus, MERGED_AT_KEY, MERGED_TO_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored cart is malformed: {0}")]
    Corrupt(String),

    #[error("Store timed out")]
    Timeout,
}

/// Raw aggregation row for the statistics window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsRow {
    pub total_carts: i64,
    pub active_carts: i64,
    pub abandoned_carts: i64,
    pub processing_carts: i64,
    pub completed_carts: i64,
    pub total_value: Decimal,
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn insert(&self, cart: &Cart) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, StoreError>;

    /// Most recently updated active cart belonging to `owner_id`
    async fn find_active_by_owner(&self, owner_id: &str) -> Result<Option<Cart>, StoreError>;

    /// Replace the stored cart only if its version is still `expected_version`.
    ///
    /// Returns the post-image with the bumped version, or `None` when the cart
    /// is gone or another writer got there first.
    async fn replace_if_version(&self, cart: &Cart, expected_version: i64) -> Result<Option<Cart>, StoreError>;

    /// Mark `source_id` completed and record `target_id` in its metadata.
    ///
    /// Applies only while the source is still active or abandoned at
    /// `expected_version`; returns false otherwise, or when it no longer exists.
    async fn retire_merged(
        &self,
        source_id: Uuid,
        expected_version: i64,
        target_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Move every active cart last updated before `cutoff` to abandoned.
    /// Leaves `updated_at` and `expires_at` untouched.
    async fn mark_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Counts and summed totals for carts created at or after `since`
    async fn aggregate_statistics(&self, since: DateTime<Utc>) -> Result<StatisticsRow, StoreError>;

    /// Physically delete carts whose expiry lies before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory store with the same semantics as the Postgres one
#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<Uuid, Cart>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn insert(&self, cart: &Cart) -> Result<(), StoreError> {
        let mut carts = self.carts.write().await;
        if carts.contains_key(&cart.id) {
            return Err(StoreError::Corrupt(format!("duplicate cart id {}", cart.id)));
        }
        carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, StoreError> {
        Ok(self.carts.read().await.get(&id).cloned())
    }

    async fn find_active_by_owner(&self, owner_id: &str) -> Result<Option<Cart>, StoreError> {
        let carts = self.carts.read().await;
        let cart = carts
            .values()
            .filter(|cart| cart.status == CartStatus::Active)
            .filter(|cart| cart.owner_id.as_deref() == Some(owner_id))
            .max_by_key(|cart| cart.updated_at)
            .cloned();
        Ok(cart)
    }

    async fn replace_if_version(&self, cart: &Cart, expected_version: i64) -> Result<Option<Cart>, StoreError> {
        let mut carts = self.carts.write().await;
        match carts.get_mut(&cart.id) {
            Some(stored) if stored.version == expected_version => {
                let mut next = cart.clone();
                next.version = expected_version + 1;
                *stored = next.clone();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    async fn retire_merged(
        &self,
        source_id: Uuid,
        expected_version: i64,
        target_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut carts = self.carts.write().await;
        let Some(source) = carts.get_mut(&source_id) else {
            return Ok(false);
        };
        let retirable = matches!(source.status, CartStatus::Active | CartStatus::Abandoned);
        if !retirable || source.version != expected_version {
            return Ok(false);
        }

        source.status = CartStatus::Completed;
        source.metadata.insert(MERGED_TO_KEY.to_string(), target_id.to_string());
        source.metadata.insert(MERGED_AT_KEY.to_string(), at.to_rfc3339());
        source.updated_at = at;
        source.version += 1;
        Ok(true)
    }

    async fn mark_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut carts = self.carts.write().await;
        let mut modified = 0;
        for cart in carts.values_mut() {
            if cart.status == CartStatus::Active && cart.updated_at < cutoff {
                cart.status = CartStatus::Abandoned;
                cart.version += 1;
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn aggregate_statistics(&self, since: DateTime<Utc>) -> Result<StatisticsRow, StoreError> {
        let carts = self.carts.read().await;
        let mut row = StatisticsRow::default();
        for cart in carts.values().filter(|cart| cart.created_at >= since) {
            row.total_carts += 1;
            row.total_value = row.total_value.saturating_add(cart.total_amount);
            match cart.status {
                CartStatus::Active => row.active_carts += 1,
                CartStatus::Abandoned => row.abandoned_carts += 1,
                CartStatus::Processing => row.processing_carts += 1,
                CartStatus::Completed => row.completed_carts += 1,
            }
        }
        Ok(row)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut carts = self.carts.write().await;
        let before = carts.len();
        carts.retain(|_, cart| cart.expires_at >= now);
        Ok((before - carts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn cart(owner: Option<&str>) -> Cart {
        Cart::new(owner.map(str::to_string), HashMap::new(), Utc::now(), Duration::hours(72))
    }

    #[tokio::test]
    async fn test_replace_if_version_bumps_version() {
        let store = InMemoryCartStore::new();
        let mut original = cart(None);
        store.insert(&original).await.unwrap();

        original.total_amount = dec!(12.00);
        let stored = store.replace_if_version(&original, 0).await.unwrap().unwrap();

        assert_eq!(stored.version, 1);
        assert_eq!(stored.total_amount, dec!(12.00));
    }

    #[tokio::test]
    async fn test_stale_version_is_refused() {
        let store = InMemoryCartStore::new();
        let original = cart(None);
        store.insert(&original).await.unwrap();

        assert!(store.replace_if_version(&original, 0).await.unwrap().is_some());
        // Second writer still holds version 0
        assert!(store.replace_if_version(&original, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_missing_cart_is_none() {
        let store = InMemoryCartStore::new();
        assert!(store.replace_if_version(&cart(None), 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_active_by_owner_ignores_other_statuses() {
        let store = InMemoryCartStore::new();
        let mut done = cart(Some("alice"));
        done.status = CartStatus::Processing;
        store.insert(&done).await.unwrap();
        assert!(store.find_active_by_owner("alice").await.unwrap().is_none());

        let live = cart(Some("alice"));
        store.insert(&live).await.unwrap();
        assert_eq!(store.find_active_by_owner("alice").await.unwrap().unwrap().id, live.id);
        assert!(store.find_active_by_owner("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retire_merged_records_target() {
        let store = InMemoryCartStore::new();
        let guest = cart(None);
        store.insert(&guest).await.unwrap();
        let target = Uuid::new_v4();

        assert!(store.retire_merged(guest.id, 0, target, Utc::now()).await.unwrap());
        let retired = store.find_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(retired.status, CartStatus::Completed);
        assert_eq!(retired.version, 1);
        assert_eq!(retired.metadata.get(MERGED_TO_KEY), Some(&target.to_string()));

        assert!(!store.retire_merged(Uuid::new_v4(), 0, target, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_retire_merged_leaves_checked_out_cart_alone() {
        let store = InMemoryCartStore::new();
        let mut guest = cart(None);
        guest.status = CartStatus::Processing;
        store.insert(&guest).await.unwrap();

        assert!(!store.retire_merged(guest.id, 0, Uuid::new_v4(), Utc::now()).await.unwrap());
        let stored = store.find_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CartStatus::Processing);
        assert!(stored.metadata.get(MERGED_TO_KEY).is_none());
    }

    #[tokio::test]
    async fn test_retire_merged_refuses_changed_source() {
        let store = InMemoryCartStore::new();
        let guest = cart(None);
        store.insert(&guest).await.unwrap();
        // Someone wrote to the guest cart after the merge read it at version 0
        store.replace_if_version(&guest, 0).await.unwrap().unwrap();

        assert!(!store.retire_merged(guest.id, 0, Uuid::new_v4(), Utc::now()).await.unwrap());
        let stored = store.find_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CartStatus::Active);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_past_horizon() {
        let store = InMemoryCartStore::new();
        let mut stale = cart(None);
        stale.expires_at = Utc::now() - Duration::minutes(1);
        store.insert(&stale).await.unwrap();
        store.insert(&cart(None)).await.unwrap();

        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.find_by_id(stale.id).await.unwrap().is_none());
    }
}
