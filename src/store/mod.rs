//! Durable order storage.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    dto::orders::OrderWithItems,
    error::AppResult,
    models::{Order, OrderStatus},
    routes::params::SortOrder,
    validation::ValidatedLineItem,
};

pub mod postgres;

pub use postgres::PgOrderStore;

/// Everything needed to persist a freshly validated order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i32,
    pub shipping_address: Option<String>,
    pub total_amount: Decimal,
    /// Non-empty, in submission order.
    pub lines: Vec<ValidatedLineItem>,
}

#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderWithItems>,
    pub total: i64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order header and all of its lines atomically.
    async fn create_order(&self, new_order: NewOrder) -> AppResult<OrderWithItems>;

    async fn list_orders(&self, user_id: i32, filter: &OrderFilter) -> AppResult<OrderPage>;

    /// `None` when the order does not exist or belongs to another user.
    async fn find_order(&self, user_id: i32, order_id: i32) -> AppResult<Option<OrderWithItems>>;

    async fn update_status(
        &self,
        user_id: i32,
        order_id: i32,
        status: OrderStatus,
    ) -> AppResult<Option<Order>>;
}
