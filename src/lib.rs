pub mod auth;
pub mod carts;
pub mod config;
pub mod db;
pub mod error;
pub mod validation;

use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use auth::TokenService;
use carts::{
    AddItemRequest, ApplyCouponRequest, Cart, CartItem, CartService, CartStatistics, CartStatus,
    Coupon, CreateCartRequest, DiscountType, MergeCartRequest, MergeCartResponse,
    StatisticsAggregator, UpdateItemRequest,
};
use error::ErrorResponse;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        carts::create_cart_handler,
        carts::get_cart_handler,
        carts::get_user_cart_handler,
        carts::add_item_handler,
        carts::update_item_handler,
        carts::remove_item_handler,
        carts::clear_cart_handler,
        carts::apply_coupon_handler,
        carts::remove_coupon_handler,
        carts::checkout_handler,
        carts::merge_cart_handler,
        carts::cart_statistics_handler,
    ),
    components(
        schemas(
            Cart, CartItem, CartStatus, Coupon, DiscountType, CartStatistics,
            CreateCartRequest, AddItemRequest, UpdateItemRequest, ApplyCouponRequest,
            MergeCartRequest, MergeCartResponse, ErrorResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "carts", description = "Shopping cart lifecycle"),
        (name = "admin", description = "Cart analytics")
    ),
    info(
        title = "Cart Service API",
        version = "1.0.0",
        description = "Shopping cart lifecycle and pricing service"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cart_service: CartService,
    pub statistics: StatisticsAggregator,
    pub tokens: Arc<TokenService>,
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Handler for GET /health
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "cart-service" }))
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and request tracing
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        .route("/carts", post(carts::create_cart_handler))
        .route("/carts/:id", get(carts::get_cart_handler))
        .route("/user/cart", get(carts::get_user_cart_handler))
        .route(
            "/carts/:id/items",
            post(carts::add_item_handler).delete(carts::clear_cart_handler),
        )
        .route(
            "/carts/:id/items/:item_id",
            put(carts::update_item_handler).delete(carts::remove_item_handler),
        )
        .route(
            "/carts/:id/coupon",
            post(carts::apply_coupon_handler).delete(carts::remove_coupon_handler),
        )
        .route("/carts/:id/checkout", post(carts::checkout_handler))
        .route("/carts/:id/merge", post(carts::merge_cart_handler))
        .route("/admin/carts/statistics", get(carts::cart_statistics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests;
