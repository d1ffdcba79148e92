use std::sync::Arc;

use cart_service::auth::TokenService;
use cart_service::carts::{
    AbandonmentSweeper, CartService, CartStore, FlatPercentageCoupons, HttpProductClient,
    InMemoryCartStore, PgCartStore, StatisticsAggregator,
};
use cart_service::config::{CartConfig, StoreBackend};
use cart_service::{create_router, db, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = CartConfig::from_env()?;

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Cart Service - Starting...");

    let store: Arc<dyn CartStore> = match config.backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set in environment")?;

            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url, config.pool_settings()).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgCartStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory cart store; carts are lost on restart");
            Arc::new(InMemoryCartStore::new())
        }
    };

    let products = HttpProductClient::new(
        config.product_service_url.clone(),
        config.product_service_timeout,
    )?;

    let cart_service = CartService::new(
        store.clone(),
        Arc::new(products),
        Arc::new(FlatPercentageCoupons::default()),
        config.cart_settings()?,
    );

    AbandonmentSweeper::new(store.clone(), config.sweeper_settings()?).spawn();

    let state = AppState {
        cart_service,
        statistics: StatisticsAggregator::new(store),
        tokens: Arc::new(TokenService::new(&config.jwt_secret)),
    };

    // Create the application router
    let app = create_router(state);

    // Start the Axum server
    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Cart Service is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
