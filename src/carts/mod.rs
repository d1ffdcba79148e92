pub mod availability;
pub mod coupon;
pub mod error;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod pricing;
pub mod repository;
pub mod service;
pub mod statistics;
pub mod status_machine;
pub mod store;
pub mod sweeper;

pub use availability::{AvailabilityError, HttpProductClient, ProductAvailability, StockTable};
pub use coupon::{CouponError, CouponResolver, FlatPercentageCoupons};
pub use error::*;
pub use handlers::*;
pub use merge::merge_items;
pub use models::*;
pub use pricing::*;
pub use repository::PgCartStore;
pub use service::*;
pub use statistics::*;
pub use status_machine::*;
pub use store::{CartStore, InMemoryCartStore, StatisticsRow, StoreError};
pub use sweeper::*;
