// HTTP handlers for cart endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::error::ErrorResponse;
use crate::carts::{
    AddItemRequest, ApplyCouponRequest, Cart, CartError, CartStatistics, CreateCartRequest,
    MergeCartRequest, StatsRange, UpdateItemRequest,
};
use crate::AppState;

/// Query parameters for cart statistics
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatisticsQuery {
    /// `day` (default), `week` or `month`
    pub range: Option<String>,
}

/// Merged cart plus whether the guest cart was retired
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub source_retired: bool,
}

/// A caller holding a token may only touch guest carts and their own carts
fn authorize(cart: &Cart, caller: Option<&str>) -> Result<(), CartError> {
    match (caller, cart.owner_id.as_deref()) {
        (Some(caller), Some(owner)) if caller != owner => Err(CartError::Forbidden(format!(
            "user {} tried to access cart {} of user {}",
            caller, cart.id, owner
        ))),
        _ => Ok(()),
    }
}

async fn load_authorized(state: &AppState, cart_id: Uuid, caller: Option<&str>) -> Result<Cart, CartError> {
    let cart = state.cart_service.get(cart_id).await?;
    authorize(&cart, caller)?;
    Ok(cart)
}

/// Handler for POST /carts
/// Creates a cart; an authenticated caller becomes its owner
#[utoipa::path(
    post,
    path = "/carts",
    request_body = CreateCartRequest,
    responses(
        (status = 201, description = "Cart created", body = Cart),
        (status = 400, description = "Invalid input data", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn create_cart_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    request: Option<Json<CreateCartRequest>>,
) -> Result<(StatusCode, Json<Cart>), CartError> {
    let Json(request) = request.unwrap_or_default();
    request.validate()?;

    let owner_id = caller.user_id().map(str::to_string).or(request.user_id);
    let cart = state.cart_service.create(owner_id, request.metadata).await?;

    Ok((StatusCode::CREATED, Json(cart)))
}

/// Handler for GET /carts/{id}
#[utoipa::path(
    get,
    path = "/carts/{id}",
    params(("id" = Uuid, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Cart found", body = Cart),
        (status = 403, description = "Cart belongs to another user", body = ErrorResponse),
        (status = 404, description = "Cart not found", body = ErrorResponse),
        (status = 410, description = "Cart has expired", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn get_cart_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<Cart>, CartError> {
    let cart = load_authorized(&state, cart_id, caller.user_id()).await?;
    Ok(Json(cart))
}

/// Handler for GET /user/cart
/// Returns the caller's active cart, starting a new one when there is none
#[utoipa::path(
    get,
    path = "/user/cart",
    responses(
        (status = 200, description = "Active cart of the caller", body = Cart),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "carts"
)]
pub async fn get_user_cart_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Cart>, CartError> {
    match state.cart_service.get_by_owner(&user.user_id).await {
        Ok(cart) => Ok(Json(cart)),
        Err(CartError::OwnerCartNotFound(_)) | Err(CartError::Expired(_)) => {
            tracing::debug!("No live cart for user {}, starting one", user.user_id);
            let cart = state
                .cart_service
                .create(Some(user.user_id), Default::default())
                .await?;
            Ok(Json(cart))
        }
        Err(e) => Err(e),
    }
}

/// Handler for POST /carts/{id}/items
#[utoipa::path(
    post,
    path = "/carts/{id}/items",
    params(("id" = Uuid, Path, description = "Cart ID")),
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Item added", body = Cart),
        (status = 400, description = "Invalid item", body = ErrorResponse),
        (status = 409, description = "Product unavailable", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn add_item_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<Cart>, CartError> {
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state.cart_service.add_item(cart_id, request).await?;
    Ok(Json(cart))
}

/// Handler for PUT /carts/{id}/items/{item_id}
#[utoipa::path(
    put,
    path = "/carts/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Cart ID"),
        ("item_id" = Uuid, Path, description = "Cart item ID")
    ),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = Cart),
        (status = 400, description = "Quantity must be positive", body = ErrorResponse),
        (status = 404, description = "Cart or item not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn update_item_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<Cart>, CartError> {
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state
        .cart_service
        .update_item(cart_id, item_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

/// Handler for DELETE /carts/{id}/items/{item_id}
#[utoipa::path(
    delete,
    path = "/carts/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Cart ID"),
        ("item_id" = Uuid, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Item removed", body = Cart),
        (status = 404, description = "Cart or item not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn remove_item_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Cart>, CartError> {
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state.cart_service.remove_item(cart_id, item_id).await?;
    Ok(Json(cart))
}

/// Handler for DELETE /carts/{id}/items
#[utoipa::path(
    delete,
    path = "/carts/{id}/items",
    params(("id" = Uuid, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Cart emptied", body = Cart),
        (status = 404, description = "Cart not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn clear_cart_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<Cart>, CartError> {
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state.cart_service.clear(cart_id).await?;
    Ok(Json(cart))
}

/// Handler for POST /carts/{id}/coupon
#[utoipa::path(
    post,
    path = "/carts/{id}/coupon",
    params(("id" = Uuid, Path, description = "Cart ID")),
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied", body = Cart),
        (status = 400, description = "Cart is empty or coupon invalid", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn apply_coupon_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<Cart>, CartError> {
    request.validate()?;
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state.cart_service.apply_coupon(cart_id, &request.code).await?;
    Ok(Json(cart))
}

/// Handler for DELETE /carts/{id}/coupon
#[utoipa::path(
    delete,
    path = "/carts/{id}/coupon",
    params(("id" = Uuid, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Coupon removed", body = Cart),
        (status = 404, description = "Cart not found", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn remove_coupon_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<Cart>, CartError> {
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state.cart_service.remove_coupon(cart_id).await?;
    Ok(Json(cart))
}

/// Handler for POST /carts/{id}/checkout
#[utoipa::path(
    post,
    path = "/carts/{id}/checkout",
    params(("id" = Uuid, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Cart moved to processing", body = Cart),
        (status = 400, description = "Cart is empty", body = ErrorResponse),
        (status = 409, description = "Cart already checked out", body = ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn checkout_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(cart_id): Path<Uuid>,
) -> Result<Json<Cart>, CartError> {
    load_authorized(&state, cart_id, caller.user_id()).await?;
    let cart = state.cart_service.checkout(cart_id).await?;
    Ok(Json(cart))
}

/// Handler for POST /carts/{id}/merge
/// Folds a guest cart into the caller's own cart
#[utoipa::path(
    post,
    path = "/carts/{id}/merge",
    params(("id" = Uuid, Path, description = "Target cart ID, owned by the caller")),
    request_body = MergeCartRequest,
    responses(
        (status = 200, description = "Carts merged", body = MergeCartResponse),
        (status = 400, description = "Target is a guest cart", body = ErrorResponse),
        (status = 403, description = "Either cart belongs to another user", body = ErrorResponse),
        (status = 404, description = "One of the carts was not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "carts"
)]
pub async fn merge_cart_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<MergeCartRequest>,
) -> Result<Json<MergeCartResponse>, CartError> {
    let target = load_authorized(&state, cart_id, Some(&user.user_id)).await?;
    if target.is_guest() {
        return Err(CartError::Validation(
            "Target cart must be a user cart".to_string(),
        ));
    }
    load_authorized(&state, request.guest_cart_id, Some(&user.user_id)).await?;

    let outcome = state.cart_service.merge(cart_id, request.guest_cart_id).await?;
    Ok(Json(MergeCartResponse {
        cart: outcome.cart,
        source_retired: outcome.source_retired,
    }))
}

/// Handler for GET /admin/carts/statistics
#[utoipa::path(
    get,
    path = "/admin/carts/statistics",
    params(StatisticsQuery),
    responses(
        (status = 200, description = "Cart analytics for the window", body = CartStatistics),
        (status = 400, description = "Unknown range", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn cart_statistics_handler(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<CartStatistics>, CartError> {
    let range = match query.range.as_deref() {
        None | Some("") => StatsRange::default(),
        Some(raw) => raw.parse::<StatsRange>().map_err(CartError::Validation)?,
    };

    let stats = state.statistics.collect(range.window()).await?;
    Ok(Json(stats))
}
