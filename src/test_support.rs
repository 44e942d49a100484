//! In-memory doubles of the service seams, for integration tests.
//!
//! Enabled through the `test-support` feature so the HTTP surface can be
//! driven without Postgres or the neighbouring services.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::{
    clients::{
        catalog::{CatalogClient, CatalogError, CatalogSnapshot},
        identity::{Identity, IdentityError, IdentityVerifier},
        inventory::{InventoryClient, InventoryError},
    },
    dto::orders::OrderWithItems,
    error::{AppError, AppResult},
    models::{Order, OrderItem, OrderStatus},
    routes::params::SortOrder,
    state::AppState,
    store::{NewOrder, OrderFilter, OrderPage, OrderStore},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct StoreInner {
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    next_order_id: i32,
    next_item_id: i32,
}

/// Order store kept in a `Vec`, with an optional forced failure on create.
#[derive(Default)]
pub struct InMemoryOrderStore {
    inner: Mutex<StoreInner>,
    fail_creates: Mutex<bool>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `create_order` fail like a lost database connection.
    pub fn fail_creates(&self) {
        *lock(&self.fail_creates) = true;
    }

    pub fn order_count(&self) -> usize {
        lock(&self.inner).orders.len()
    }

    pub fn item_count(&self) -> usize {
        lock(&self.inner).items.len()
    }

    fn with_items(inner: &StoreInner, order: &Order) -> OrderWithItems {
        OrderWithItems {
            order: order.clone(),
            items: inner
                .items
                .iter()
                .filter(|item| item.order_id == order.id)
                .cloned()
                .collect(),
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, new_order: NewOrder) -> AppResult<OrderWithItems> {
        if *lock(&self.fail_creates) {
            return Err(AppError::Internal(anyhow::anyhow!("store offline")));
        }
        if new_order.lines.is_empty() {
            return Err(AppError::BadRequest(
                "Order must contain at least one item".into(),
            ));
        }

        let mut inner = lock(&self.inner);
        let now = Utc::now();
        inner.next_order_id += 1;
        let order = Order {
            id: inner.next_order_id,
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            total_amount: new_order.total_amount,
            shipping_address: new_order.shipping_address,
            created_at: now,
            updated_at: now,
        };

        let mut items = Vec::with_capacity(new_order.lines.len());
        for line in new_order.lines {
            inner.next_item_id += 1;
            items.push(OrderItem {
                id: inner.next_item_id,
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.unit_price,
                created_at: now,
            });
        }

        inner.orders.push(order.clone());
        inner.items.extend(items.iter().cloned());
        Ok(OrderWithItems { order, items })
    }

    async fn list_orders(&self, user_id: i32, filter: &OrderFilter) -> AppResult<OrderPage> {
        let inner = lock(&self.inner);
        let mut matching: Vec<&Order> = inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .filter(|o| filter.status.is_none_or(|status| o.status == status))
            .collect();
        matching.sort_by_key(|o| (o.created_at, o.id));
        if matches!(filter.sort_order, SortOrder::Desc) {
            matching.reverse();
        }

        let total = matching.len() as i64;
        let orders = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(|o| Self::with_items(&inner, o))
            .collect();
        Ok(OrderPage { orders, total })
    }

    async fn find_order(&self, user_id: i32, order_id: i32) -> AppResult<Option<OrderWithItems>> {
        let inner = lock(&self.inner);
        Ok(inner
            .orders
            .iter()
            .find(|o| o.id == order_id && o.user_id == user_id)
            .map(|o| Self::with_items(&inner, o)))
    }

    async fn update_status(
        &self,
        user_id: i32,
        order_id: i32,
        status: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let mut inner = lock(&self.inner);
        let Some(order) = inner
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && o.user_id == user_id)
        else {
            return Ok(None);
        };
        order.status = status;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}

/// Catalog answering from a fixed product table.
#[derive(Default)]
pub struct StaticCatalog {
    products: HashMap<i32, CatalogSnapshot>,
    unavailable: HashSet<i32>,
    delays: HashMap<i32, Duration>,
    calls: Mutex<Vec<i32>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product_id: i32, name: &str, price: Decimal, stock: i32) -> Self {
        self.products.insert(
            product_id,
            CatalogSnapshot {
                product_id,
                name: name.to_string(),
                unit_price: price,
                available_stock: stock,
            },
        );
        self
    }

    /// Lookups of `product_id` fail as if the catalog could not be reached.
    pub fn with_outage(mut self, product_id: i32) -> Self {
        self.unavailable.insert(product_id);
        self
    }

    /// Lookups of `product_id` answer only after `delay`.
    pub fn with_delay(mut self, product_id: i32, delay: Duration) -> Self {
        self.delays.insert(product_id, delay);
        self
    }

    pub fn calls(&self) -> Vec<i32> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn fetch(&self, product_id: i32) -> Result<CatalogSnapshot, CatalogError> {
        lock(&self.calls).push(product_id);
        if let Some(delay) = self.delays.get(&product_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.unavailable.contains(&product_id) {
            return Err(CatalogError::Unavailable {
                product_id,
                reason: "connection refused".into(),
            });
        }
        self.products
            .get(&product_id)
            .cloned()
            .ok_or(CatalogError::NotFound(product_id))
    }
}

/// Identity check backed by a token table.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, user_id: i32, email: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            Identity {
                user_id,
                email: email.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::Rejected("unknown token".into()))
    }
}

/// One call observed by [`RecordingInventory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryCall {
    Reserve { product_id: i32, quantity: i32 },
    Release { product_id: i32, quantity: i32 },
}

/// Inventory that records every call and rejects configured products.
#[derive(Default)]
pub struct RecordingInventory {
    rejected: HashSet<i32>,
    timing_out: HashSet<i32>,
    calls: Mutex<Vec<InventoryCall>>,
}

impl RecordingInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, product_id: i32) -> Self {
        self.rejected.insert(product_id);
        self
    }

    /// Reserve `product_id` but answer as if the response never arrived.
    pub fn timing_out(mut self, product_id: i32) -> Self {
        self.timing_out.insert(product_id);
        self
    }

    pub fn calls(&self) -> Vec<InventoryCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl InventoryClient for RecordingInventory {
    async fn reserve(&self, product_id: i32, quantity: i32) -> Result<(), InventoryError> {
        if self.rejected.contains(&product_id) {
            return Err(InventoryError::Rejected {
                product_id,
                reason: "insufficient inventory".into(),
            });
        }
        lock(&self.calls).push(InventoryCall::Reserve {
            product_id,
            quantity,
        });
        if self.timing_out.contains(&product_id) {
            return Err(InventoryError::Unavailable {
                product_id,
                reason: "timed out".into(),
            });
        }
        Ok(())
    }

    async fn release(&self, product_id: i32, quantity: i32) -> Result<(), InventoryError> {
        lock(&self.calls).push(InventoryCall::Release {
            product_id,
            quantity,
        });
        Ok(())
    }
}

/// Assemble an [`AppState`] from in-memory parts.
pub fn state_with(
    store: Arc<InMemoryOrderStore>,
    catalog: Arc<StaticCatalog>,
    identity: Arc<StaticIdentity>,
    inventory: Option<Arc<RecordingInventory>>,
    lookup_concurrency: usize,
) -> AppState {
    AppState {
        store,
        catalog,
        identity,
        inventory: inventory.map(|inv| inv as Arc<dyn InventoryClient>),
        lookup_concurrency,
    }
}
