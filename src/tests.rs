// Handler tests for the Cart Service API
// Runs the full router against the in-memory store and a fixed stock table

use super::*;
use crate::auth::token::sign_for_tests;
use crate::carts::{
    CartSettings, CartStatus, FlatPercentageCoupons, InMemoryCartStore, StockTable,
};
use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

const SECRET: &str = "handler-test-secret";

// ============================================================================
// Test Helpers
// ============================================================================

/// Helper function to create a test app backed by the in-memory store
fn create_test_app() -> TestServer {
    let store = Arc::new(InMemoryCartStore::new());
    let stock = StockTable::new()
        .with_stock("espresso-beans", 50)
        .with_stock("grinder", 1);

    let state = AppState {
        cart_service: CartService::new(
            store.clone(),
            Arc::new(stock),
            Arc::new(FlatPercentageCoupons::default()),
            CartSettings::default(),
        ),
        statistics: StatisticsAggregator::new(store),
        tokens: Arc::new(TokenService::new(SECRET)),
    };

    TestServer::new(create_router(state)).unwrap()
}

fn bearer(user_id: &str) -> HeaderValue {
    let token = sign_for_tests(SECRET, user_id, 900);
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn item_payload(product_id: &str, quantity: i32) -> serde_json::Value {
    json!({
        "productId": product_id,
        "title": "Test Product",
        "price": "10.00",
        "quantity": quantity
    })
}

async fn create_guest_cart(server: &TestServer) -> Cart {
    let response = server.post("/carts").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Cart>()
}

async fn create_user_cart(server: &TestServer, user_id: &str) -> Cart {
    let response = server
        .post("/carts")
        .add_header(AUTHORIZATION, bearer(user_id))
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Cart>()
}

fn error_code(response: &axum_test::TestResponse) -> String {
    response.json::<ErrorResponse>().error_code
}

// ============================================================================
// Health / Create / Get
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = create_test_app();
    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_openapi_document_references_error_body() {
    let server = create_test_app();
    let response = server.get("/api-docs/openapi.json").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let doc = response.json::<Value>();
    assert!(doc["components"]["schemas"]["ErrorResponse"].is_object());
    let forbidden = &doc["paths"]["/carts/{id}/merge"]["post"]["responses"]["403"];
    assert_eq!(
        forbidden["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/ErrorResponse"
    );
}

#[tokio::test]
async fn test_create_guest_cart() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    assert!(cart.owner_id.is_none());
    assert_eq!(cart.status, CartStatus::Active);
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn test_create_cart_without_body() {
    let server = create_test_app();
    let response = server.post("/carts").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_token_subject_owns_created_cart() {
    let server = create_test_app();
    let response = server
        .post("/carts")
        .add_header(AUTHORIZATION, bearer("alice"))
        .json(&json!({ "userId": "mallory" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert_eq!(response.json::<Cart>().owner_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_get_cart_by_id() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    let response = server.get(&format!("/carts/{}", cart.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Cart>().id, cart.id);
}

#[tokio::test]
async fn test_get_unknown_cart_returns_404() {
    let server = create_test_app();
    let response = server.get(&format!("/carts/{}", Uuid::new_v4())).await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response), "CART_NOT_FOUND");
}

#[tokio::test]
async fn test_get_cart_with_malformed_id() {
    let server = create_test_app();
    let response = server.get("/carts/not-a-uuid").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_users_cart_is_forbidden() {
    let server = create_test_app();
    let cart = create_user_cart(&server, "alice").await;

    let response = server
        .get(&format!("/carts/{}", cart.id))
        .add_header(AUTHORIZATION, bearer("mallory"))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(&response), "FORBIDDEN");
}

// ============================================================================
// User cart
// ============================================================================

#[tokio::test]
async fn test_user_cart_requires_token() {
    let server = create_test_app();
    let response = server.get("/user/cart").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&response), "MISSING_TOKEN");
}

#[tokio::test]
async fn test_user_cart_rejects_bad_token() {
    let server = create_test_app();
    let response = server
        .get("/user/cart")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer garbage"))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_cart_is_created_on_first_visit_and_reused() {
    let server = create_test_app();

    let first = server
        .get("/user/cart")
        .add_header(AUTHORIZATION, bearer("alice"))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let first = first.json::<Cart>();
    assert_eq!(first.owner_id.as_deref(), Some("alice"));

    let second = server
        .get("/user/cart")
        .add_header(AUTHORIZATION, bearer("alice"))
        .await
        .json::<Cart>();
    assert_eq!(second.id, first.id);
}

// ============================================================================
// Items / Coupons / Checkout
// ============================================================================

#[tokio::test]
async fn test_add_update_and_remove_item() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("espresso-beans", 2))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let cart = response.json::<Cart>();
    assert_eq!(cart.subtotal, dec!(20.00));
    assert_eq!(cart.total_amount, dec!(23.60));

    let item_id = cart.items[0].id;
    let response = server
        .put(&format!("/carts/{}/items/{}", cart.id, item_id))
        .json(&json!({ "quantity": 3 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Cart>().items[0].quantity, 3);

    let response = server
        .delete(&format!("/carts/{}/items/{}", cart.id, item_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let cart = response.json::<Cart>();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_amount, dec!(0));
}

#[tokio::test]
async fn test_zero_quantity_update_is_rejected() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;
    let cart = server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("espresso-beans", 1))
        .await
        .json::<Cart>();

    let response = server
        .put(&format!("/carts/{}/items/{}", cart.id, cart.items[0].id))
        .json(&json!({ "quantity": 0 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "INVALID_QUANTITY");
}

#[tokio::test]
async fn test_unavailable_product_is_rejected() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("grinder", 2))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(error_code(&response), "PRODUCT_UNAVAILABLE");
}

#[tokio::test]
async fn test_blank_product_id_fails_validation() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("  ", 1))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_coupon_on_empty_cart() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/coupon", cart.id))
        .json(&json!({ "code": "WELCOME10" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "CART_EMPTY");
}

#[tokio::test]
async fn test_coupon_apply_and_remove() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;
    server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("espresso-beans", 2))
        .await;

    let response = server
        .post(&format!("/carts/{}/coupon", cart.id))
        .json(&json!({ "code": "welcome10" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let discounted = response.json::<Cart>();
    assert_eq!(discounted.coupon.as_ref().map(|c| c.code.as_str()), Some("WELCOME10"));
    assert_eq!(discounted.total_amount, dec!(21.24));

    let response = server.delete(&format!("/carts/{}/coupon", cart.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Cart>().total_amount, dec!(23.60));
}

#[tokio::test]
async fn test_clear_cart() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;
    server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("espresso-beans", 2))
        .await;

    let response = server.delete(&format!("/carts/{}/items", cart.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let cart = response.json::<Cart>();
    assert!(cart.items.is_empty());
    assert_eq!(cart.subtotal, dec!(0));
}

#[tokio::test]
async fn test_checkout_and_frozen_cart() {
    let server = create_test_app();
    let cart = create_guest_cart(&server).await;

    let response = server.post(&format!("/carts/{}/checkout", cart.id)).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "CART_EMPTY");

    server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("espresso-beans", 1))
        .await;

    let response = server.post(&format!("/carts/{}/checkout", cart.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Cart>().status, CartStatus::Processing);

    let response = server
        .post(&format!("/carts/{}/items", cart.id))
        .json(&item_payload("espresso-beans", 1))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(error_code(&response), "INVALID_CART_STATE");
}

// ============================================================================
// Merge
// ============================================================================

#[tokio::test]
async fn test_merge_guest_cart_into_user_cart() {
    let server = create_test_app();
    let user_cart = create_user_cart(&server, "alice").await;
    let guest_cart = create_guest_cart(&server).await;

    server
        .post(&format!("/carts/{}/items", user_cart.id))
        .add_header(AUTHORIZATION, bearer("alice"))
        .json(&item_payload("espresso-beans", 1))
        .await;
    server
        .post(&format!("/carts/{}/items", guest_cart.id))
        .json(&item_payload("espresso-beans", 2))
        .await;

    let response = server
        .post(&format!("/carts/{}/merge", user_cart.id))
        .add_header(AUTHORIZATION, bearer("alice"))
        .json(&json!({ "guestCartId": guest_cart.id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["sourceRetired"], true);
    assert_eq!(body["items"][0]["quantity"], 3);

    let guest = server.get(&format!("/carts/{}", guest_cart.id)).await.json::<Cart>();
    assert_eq!(guest.status, CartStatus::Completed);
}

#[tokio::test]
async fn test_merge_requires_token() {
    let server = create_test_app();
    let guest_cart = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/merge", Uuid::new_v4()))
        .json(&json!({ "guestCartId": guest_cart.id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_merge_into_guest_cart_is_rejected() {
    let server = create_test_app();
    let target = create_guest_cart(&server).await;
    let source = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/merge", target.id))
        .add_header(AUTHORIZATION, bearer("alice"))
        .json(&json!({ "guestCartId": source.id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_merge_into_someone_elses_cart_is_forbidden() {
    let server = create_test_app();
    let target = create_user_cart(&server, "alice").await;
    let source = create_guest_cart(&server).await;

    let response = server
        .post(&format!("/carts/{}/merge", target.id))
        .add_header(AUTHORIZATION, bearer("mallory"))
        .json(&json!({ "guestCartId": source.id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_merge_of_another_users_cart_is_forbidden() {
    let server = create_test_app();
    let bob_cart = create_user_cart(&server, "bob").await;
    let mallory_cart = create_user_cart(&server, "mallory").await;

    server
        .post(&format!("/carts/{}/items", bob_cart.id))
        .add_header(AUTHORIZATION, bearer("bob"))
        .json(&item_payload("espresso-beans", 2))
        .await;

    let response = server
        .post(&format!("/carts/{}/merge", mallory_cart.id))
        .add_header(AUTHORIZATION, bearer("mallory"))
        .json(&json!({ "guestCartId": bob_cart.id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(&response), "FORBIDDEN");

    let bob = server
        .get(&format!("/carts/{}", bob_cart.id))
        .add_header(AUTHORIZATION, bearer("bob"))
        .await
        .json::<Cart>();
    assert_eq!(bob.status, CartStatus::Active);
    assert_eq!(bob.items.len(), 1);
    assert_eq!(bob.items[0].quantity, 2);

    let mallory = server
        .get(&format!("/carts/{}", mallory_cart.id))
        .add_header(AUTHORIZATION, bearer("mallory"))
        .await
        .json::<Cart>();
    assert!(mallory.items.is_empty());
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn test_statistics_default_range() {
    let server = create_test_app();
    create_guest_cart(&server).await;
    create_guest_cart(&server).await;

    let response = server
        .get("/admin/carts/statistics")
        .add_header(AUTHORIZATION, bearer("ops"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let stats = response.json::<CartStatistics>();
    assert_eq!(stats.total_carts, 2);
    assert_eq!(stats.active_carts, 2);
    assert_eq!(stats.average_cart_value, dec!(0));
}

#[tokio::test]
async fn test_statistics_accepts_named_ranges() {
    let server = create_test_app();
    for range in ["day", "week", "month"] {
        let response = server
            .get(&format!("/admin/carts/statistics?range={}", range))
            .add_header(AUTHORIZATION, bearer("ops"))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_statistics_unknown_range_is_rejected() {
    let server = create_test_app();
    let response = server
        .get("/admin/carts/statistics?range=year")
        .add_header(AUTHORIZATION, bearer("ops"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_statistics_requires_token() {
    let server = create_test_app();
    let response = server.get("/admin/carts/statistics").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
