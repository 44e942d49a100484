use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;

use super::{NewOrder, OrderFilter, OrderPage, OrderStore};
use crate::{
    db::{DbPool, OrmConn},
    dto::orders::OrderWithItems,
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    models::{Order, OrderItem, OrderStatus},
    routes::params::SortOrder,
};

/// Postgres-backed store. Writes go through SeaORM transactions, point reads
/// and the status update through sqlx on the same pool.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: DbPool,
    orm: OrmConn,
}

impl PgOrderStore {
    pub fn new(pool: DbPool, orm: OrmConn) -> Self {
        Self { pool, orm }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    status: String,
    total_amount: Decimal,
    shipping_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            status: parse_stored_status(row.id, &row.status)?,
            total_amount: row.total_amount,
            shipping_address: row.shipping_address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, new_order: NewOrder) -> AppResult<OrderWithItems> {
        if new_order.lines.is_empty() {
            return Err(AppError::BadRequest(
                "Order must contain at least one item".into(),
            ));
        }

        // Dropping the transaction before commit rolls every insert back.
        let txn = self.orm.begin().await?;

        let order = OrderActive {
            id: NotSet,
            user_id: Set(new_order.user_id),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            total_amount: Set(new_order.total_amount),
            shipping_address: Set(new_order.shipping_address),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(new_order.lines.len());
        for line in &new_order.lines {
            let item = OrderItemActive {
                id: NotSet,
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(line.unit_price),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
            items.push(order_item_from_entity(item));
        }

        txn.commit().await?;

        Ok(OrderWithItems {
            order: order_from_entity(order)?,
            items,
        })
    }

    async fn list_orders(&self, user_id: i32, filter: &OrderFilter) -> AppResult<OrderPage> {
        let mut condition = Condition::all().add(OrderCol::UserId.eq(user_id));
        if let Some(status) = filter.status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }

        let mut finder = Orders::find().filter(condition);
        finder = match filter.sort_order {
            SortOrder::Asc => finder
                .order_by_asc(OrderCol::CreatedAt)
                .order_by_asc(OrderCol::Id),
            SortOrder::Desc => finder
                .order_by_desc(OrderCol::CreatedAt)
                .order_by_desc(OrderCol::Id),
        };

        let total = finder.clone().count(&self.orm).await? as i64;

        let orders = finder
            .limit(filter.limit as u64)
            .offset(filter.offset as u64)
            .all(&self.orm)
            .await?;

        let ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<i32, Vec<OrderItem>> = HashMap::new();
        if !ids.is_empty() {
            let items = OrderItems::find()
                .filter(OrderItemCol::OrderId.is_in(ids))
                .order_by_asc(OrderItemCol::Id)
                .all(&self.orm)
                .await?;
            for item in items {
                items_by_order
                    .entry(item.order_id)
                    .or_default()
                    .push(order_item_from_entity(item));
            }
        }

        let orders = orders
            .into_iter()
            .map(|model| {
                let items = items_by_order.remove(&model.id).unwrap_or_default();
                Ok(OrderWithItems {
                    order: order_from_entity(model)?,
                    items,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(OrderPage { orders, total })
    }

    async fn find_order(&self, user_id: i32, order_id: i32) -> AppResult<Option<OrderWithItems>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, status, total_amount, shipping_address, created_at, updated_at \
             FROM orders WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, quantity, price, created_at \
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderWithItems {
            order: row.try_into()?,
            items,
        }))
    }

    async fn update_status(
        &self,
        user_id: i32,
        order_id: i32,
        status: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET status = $1, updated_at = now() \
             WHERE id = $2 AND user_id = $3 \
             RETURNING id, user_id, status, total_amount, shipping_address, created_at, updated_at",
        )
        .bind(status.as_str())
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}

fn parse_stored_status(order_id: i32, raw: &str) -> AppResult<OrderStatus> {
    raw.parse::<OrderStatus>()
        .map_err(|_| AppError::Internal(anyhow!("order {order_id} has unknown status {raw:?}")))
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        status: parse_stored_status(model.id, &model.status)?,
        total_amount: model.total_amount,
        shipping_address: model.shipping_address,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
