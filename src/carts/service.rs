use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::carts::availability::ProductAvailability;
use crate::carts::coupon::CouponResolver;
use crate::carts::merge::merge_items;
use crate::carts::store::CartStore;
use crate::carts::{
    AddItemRequest, Cart, CartError, CartItem, CartStatus, PricingEngine, StatusMachine,
};

/// Values the lifecycle manager is constructed with
#[derive(Debug, Clone)]
pub struct CartSettings {
    /// Rolling expiry horizon renewed by every mutation
    pub cart_ttl: Duration,
    pub tax_rate: Decimal,
    pub shipping_cost: Decimal,
    /// Conditional write attempts before giving up with `ConcurrentModification`
    pub max_write_attempts: u32,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            cart_ttl: Duration::hours(72),
            tax_rate: Decimal::new(18, 2),
            shipping_cost: Decimal::ZERO,
            max_write_attempts: 3,
        }
    }
}

/// Result of folding a guest cart into a user cart
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Target cart after the merge was committed
    pub cart: Cart,
    /// False when the guest cart could not be marked completed afterwards.
    /// The merge itself stands either way.
    pub source_retired: bool,
}

/// Whether a committed mutation pushes the expiry horizon forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Renew,
    Keep,
}

/// How the monetary fields are derived after a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Totals {
    /// Run the pricing rules, shipping included
    Recompute,
    /// Every monetary field back to zero, as on a fresh cart
    Zero,
}

/// Cart lifecycle manager.
///
/// Every mutation is read, change, reprice, then a write conditional on the
/// version that was read. A lost race re-reads and replays the change.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
    products: Arc<dyn ProductAvailability>,
    coupons: Arc<dyn CouponResolver>,
    settings: CartSettings,
}

impl CartService {
    /// Create a new CartService
    pub fn new(
        store: Arc<dyn CartStore>,
        products: Arc<dyn ProductAvailability>,
        coupons: Arc<dyn CouponResolver>,
        settings: CartSettings,
    ) -> Self {
        Self {
            store,
            products,
            coupons,
            settings,
        }
    }

    pub fn settings(&self) -> &CartSettings {
        &self.settings
    }

    /// Create an empty active cart, owned by `owner_id` or a guest cart when absent
    pub async fn create(
        &self,
        owner_id: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<Cart, CartError> {
        let cart = Cart::new(owner_id, metadata, Utc::now(), self.settings.cart_ttl);
        self.store.insert(&cart).await?;

        info!(
            "Created cart {} for {}",
            cart.id,
            cart.owner_id.as_deref().unwrap_or("guest")
        );
        Ok(cart)
    }

    /// Fetch a cart by id
    ///
    /// # Errors
    /// - `NotFound` if no such cart is stored
    /// - `Expired` if its expiry lies in the past, even though the record still exists
    pub async fn get(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        debug!("Fetching cart {}", cart_id);
        self.load_live(cart_id).await
    }

    /// The active cart belonging to `owner_id`.
    ///
    /// `NotFound` and `Expired` are the caller's cue to create a fresh cart.
    pub async fn get_by_owner(&self, owner_id: &str) -> Result<Cart, CartError> {
        debug!("Fetching active cart of user {}", owner_id);
        let cart = self
            .store
            .find_active_by_owner(owner_id)
            .await?
            .ok_or(CartError::OwnerCartNotFound(owner_id.to_string()))?;

        if cart.is_expired_at(Utc::now()) {
            return Err(CartError::Expired(cart.id));
        }
        Ok(cart)
    }

    /// Add a product line, or grow the existing line for the same product.
    ///
    /// Availability is confirmed for the requested quantity before anything is written.
    pub async fn add_item(&self, cart_id: Uuid, request: AddItemRequest) -> Result<Cart, CartError> {
        if request.quantity <= 0 {
            return Err(CartError::InvalidQuantity(i64::from(request.quantity)));
        }
        request.validate()?;

        let cart = self.load_live(cart_id).await?;
        ensure_accepts_changes(&cart)?;

        self.products
            .check_availability(&request.product_id, request.quantity)
            .await?;

        let product_id = request.product_id.clone();
        let saved = self
            .mutate(cart, Expiry::Renew, Totals::Recompute, |cart, now| {
                match cart
                    .items
                    .iter_mut()
                    .find(|item| item.product_id == request.product_id)
                {
                    Some(line) => {
                        line.quantity = line.quantity.checked_add(request.quantity).ok_or(
                            CartError::InvalidQuantity(
                                i64::from(line.quantity) + i64::from(request.quantity),
                            ),
                        )?;
                    }
                    None => cart.items.push(CartItem::from_request(request.clone(), now)),
                }
                Ok(())
            })
            .await?;

        info!("Added product {} to cart {}", product_id, cart_id);
        Ok(saved)
    }

    /// Set a line's quantity. Zero and negative quantities are rejected, never
    /// treated as a removal.
    pub async fn update_item(&self, cart_id: Uuid, item_id: Uuid, quantity: i32) -> Result<Cart, CartError> {
        if quantity <= 0 {
            return Err(CartError::InvalidQuantity(i64::from(quantity)));
        }

        let cart = self.load_live(cart_id).await?;
        ensure_accepts_changes(&cart)?;
        let product_id = cart
            .find_item(item_id)
            .map(|item| item.product_id.clone())
            .ok_or(CartError::ItemNotFound(item_id))?;

        self.products.check_availability(&product_id, quantity).await?;

        let saved = self
            .mutate(cart, Expiry::Renew, Totals::Recompute, |cart, _| {
                let line = cart
                    .find_item_mut(item_id)
                    .ok_or(CartError::ItemNotFound(item_id))?;
                line.quantity = quantity;
                Ok(())
            })
            .await?;

        info!("Set item {} of cart {} to quantity {}", item_id, cart_id, quantity);
        Ok(saved)
    }

    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Cart, CartError> {
        let cart = self.load_live(cart_id).await?;

        let saved = self
            .mutate(cart, Expiry::Renew, Totals::Recompute, |cart, _| {
                let index = cart
                    .items
                    .iter()
                    .position(|item| item.id == item_id)
                    .ok_or(CartError::ItemNotFound(item_id))?;
                cart.items.remove(index);
                Ok(())
            })
            .await?;

        info!("Removed item {} from cart {}", item_id, cart_id);
        Ok(saved)
    }

    /// Drop every line and the coupon. All monetary fields end at zero,
    /// shipping included, which is the one place an empty cart is not priced.
    pub async fn clear(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let cart = self.load_live(cart_id).await?;

        let saved = self
            .mutate(cart, Expiry::Renew, Totals::Zero, |cart, _| {
                cart.items.clear();
                cart.coupon = None;
                Ok(())
            })
            .await?;

        info!("Cleared cart {}", cart_id);
        Ok(saved)
    }

    /// Replace any applied coupon with the one resolved from `code`
    pub async fn apply_coupon(&self, cart_id: Uuid, code: &str) -> Result<Cart, CartError> {
        let cart = self.load_live(cart_id).await?;
        ensure_accepts_changes(&cart)?;
        if cart.is_empty() {
            warn!("Coupon {} refused: cart {} is empty", code, cart_id);
            return Err(CartError::CartEmpty(cart_id));
        }

        let coupon = self.coupons.resolve(code, Utc::now()).await?;

        let saved = self
            .mutate(cart, Expiry::Renew, Totals::Recompute, |cart, _| {
                if cart.is_empty() {
                    return Err(CartError::CartEmpty(cart.id));
                }
                cart.coupon = Some(coupon.clone());
                Ok(())
            })
            .await?;

        info!("Applied coupon {} to cart {}", coupon.code, cart_id);
        Ok(saved)
    }

    pub async fn remove_coupon(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let cart = self.load_live(cart_id).await?;

        let saved = self
            .mutate(cart, Expiry::Renew, Totals::Recompute, |cart, _| {
                cart.coupon = None;
                Ok(())
            })
            .await?;

        info!("Removed coupon from cart {}", cart_id);
        Ok(saved)
    }

    /// Hand the cart over for settlement. The expiry is left where it is.
    pub async fn checkout(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let cart = self.load_live(cart_id).await?;

        let saved = self
            .mutate(cart, Expiry::Keep, Totals::Recompute, |cart, _| {
                if cart.is_empty() {
                    return Err(CartError::CartEmpty(cart.id));
                }
                cart.status = StatusMachine::transition(cart.status, CartStatus::Processing)
                    .map_err(|_| invalid_state(cart))?;
                Ok(())
            })
            .await?;

        info!("Cart {} checked out, total {}", cart_id, saved.total_amount);
        Ok(saved)
    }

    /// Fold the guest cart `source_id` into `target_id`.
    ///
    /// The target write is the merge. Retiring the guest cart afterwards is a
    /// second write whose failure is logged and reported in the outcome.
    pub async fn merge(&self, target_id: Uuid, source_id: Uuid) -> Result<MergeOutcome, CartError> {
        if target_id == source_id {
            return Err(CartError::InvalidState {
                id: target_id,
                status: "merge source and target are the same cart".to_string(),
            });
        }

        let source = self.load_live(source_id).await?;
        ensure_accepts_changes(&source)?;
        let target = self.load_live(target_id).await?;

        // Only a guest cart, or another cart of the same owner, can be folded in
        if let Some(source_owner) = source.owner_id.as_deref() {
            if target.owner_id.as_deref() != Some(source_owner) {
                return Err(CartError::Forbidden(format!(
                    "cart {} of user {} cannot be merged into cart {}",
                    source_id, source_owner, target_id
                )));
            }
        }

        let cart = self
            .mutate(target, Expiry::Renew, Totals::Recompute, |cart, _| {
                merge_items(&mut cart.items, &source.items).map_err(|product_id| {
                    CartError::Validation(format!(
                        "merged quantity of product {} is out of range",
                        product_id
                    ))
                })
            })
            .await?;

        info!(
            "Merged {} lines of cart {} into cart {}",
            source.items.len(),
            source_id,
            target_id
        );

        let source_retired = match self
            .store
            .retire_merged(source_id, source.version, target_id, Utc::now())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    "Merged cart {} changed or vanished before it could be retired",
                    source_id
                );
                false
            }
            Err(e) => {
                warn!("Failed to retire merged cart {}: {}", source_id, e);
                false
            }
        };

        Ok(MergeOutcome {
            cart,
            source_retired,
        })
    }

    /// Load a cart and refuse it when logically expired
    async fn load_live(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let cart = self
            .store
            .find_by_id(cart_id)
            .await?
            .ok_or(CartError::NotFound(cart_id))?;

        if cart.is_expired_at(Utc::now()) {
            debug!("Cart {} expired at {}", cart_id, cart.expires_at);
            return Err(CartError::Expired(cart_id));
        }
        Ok(cart)
    }

    /// Apply `change`, reprice and write conditionally on the version read.
    ///
    /// On a lost race the cart is reloaded and `change` replayed against the
    /// fresh copy, up to `max_write_attempts` writes in total.
    async fn mutate<F>(
        &self,
        mut cart: Cart,
        expiry: Expiry,
        totals: Totals,
        mut change: F,
    ) -> Result<Cart, CartError>
    where
        F: FnMut(&mut Cart, DateTime<Utc>) -> Result<(), CartError>,
    {
        let cart_id = cart.id;
        let attempts = self.settings.max_write_attempts.max(1);

        for attempt in 1..=attempts {
            let now = Utc::now();
            let expected_version = cart.version;

            revive_if_abandoned(&mut cart)?;
            change(&mut cart, now)?;
            self.reprice(&mut cart, totals)?;
            cart.touch(
                now,
                match expiry {
                    Expiry::Renew => Some(self.settings.cart_ttl),
                    Expiry::Keep => None,
                },
            );

            if let Some(saved) = self.store.replace_if_version(&cart, expected_version).await? {
                return Ok(saved);
            }

            debug!(
                "Write conflict on cart {} (attempt {}/{})",
                cart_id, attempt, attempts
            );
            if attempt < attempts {
                cart = self.load_live(cart_id).await?;
            } else if self.store.find_by_id(cart_id).await?.is_none() {
                return Err(CartError::NotFound(cart_id));
            }
        }

        warn!("Giving up on cart {} after {} conflicting writes", cart_id, attempts);
        Err(CartError::ConcurrentModification(cart_id))
    }

    /// A cart left without lines also loses its coupon
    fn reprice(&self, cart: &mut Cart, totals: Totals) -> Result<(), CartError> {
        if cart.is_empty() {
            cart.coupon = None;
        }
        match totals {
            Totals::Zero => cart.zero_totals(),
            Totals::Recompute => cart.apply_totals(PricingEngine::recompute(
                &cart.items,
                cart.coupon.as_ref(),
                self.settings.tax_rate,
                self.settings.shipping_cost,
            )?),
        }
        Ok(())
    }
}

fn invalid_state(cart: &Cart) -> CartError {
    CartError::InvalidState {
        id: cart.id,
        status: cart.status.to_string(),
    }
}

fn ensure_accepts_changes(cart: &Cart) -> Result<(), CartError> {
    if StatusMachine::accepts_changes(cart.status) {
        Ok(())
    } else {
        Err(invalid_state(cart))
    }
}

/// A shopper touching an abandoned cart brings it back to active
fn revive_if_abandoned(cart: &mut Cart) -> Result<(), CartError> {
    ensure_accepts_changes(cart)?;
    if cart.status == CartStatus::Abandoned {
        cart.status = StatusMachine::transition(cart.status, CartStatus::Active)
            .map_err(|_| invalid_state(cart))?;
        debug!("Cart {} reactivated", cart.id);
    }
    Ok(())
}
