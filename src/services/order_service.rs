use futures_util::{StreamExt, stream};

use crate::{
    clients::inventory::{InventoryClient, InventoryError},
    dto::orders::{OrderCreate, OrderLineRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
    store::{NewOrder, OrderFilter},
    validation::{self, ValidatedLineItem},
};

/// Validate every requested line against the catalog, then persist the order
/// and its lines in one transaction.
///
/// No transaction is open while the catalog (or inventory) is being called.
/// The first failing line in submission order decides the error, even when
/// lookups run concurrently.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: OrderCreate,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest(
            "Order must contain at least one item".into(),
        ));
    }

    let lines = validate_lines(state, &payload.items).await?;
    let total_amount = validation::order_total(&lines)?;

    if let Some(inventory) = state.inventory.as_deref() {
        reserve_lines(inventory, &lines).await?;
    }

    let new_order = NewOrder {
        user_id: user.user_id,
        shipping_address: payload.shipping_address,
        total_amount,
        lines: lines.clone(),
    };

    let created = match state.store.create_order(new_order).await {
        Ok(created) => created,
        Err(err) => {
            if let Some(inventory) = state.inventory.as_deref() {
                release_lines(inventory, &lines).await;
            }
            return Err(err);
        }
    };

    tracing::info!(
        order_id = created.order.id,
        user_id = user.user_id,
        lines = created.items.len(),
        total_amount = %created.order.total_amount,
        "order created"
    );

    Ok(ApiResponse::success(
        "Order created successfully",
        created,
        Some(Meta::empty()),
    ))
}

async fn validate_lines(
    state: &AppState,
    items: &[OrderLineRequest],
) -> AppResult<Vec<ValidatedLineItem>> {
    let catalog = state.catalog.as_ref();

    // `buffered` yields in input order, so the fold below sees lines exactly as submitted.
    let mut results = stream::iter(items.to_vec())
        .map(move |line| async move {
            validation::check_quantity(&line)?;
            let snapshot = catalog.fetch(line.product_id).await?;
            Ok::<_, AppError>(validation::validate_line(&line, &snapshot)?)
        })
        .buffered(state.lookup_concurrency.max(1));

    let mut validated = Vec::with_capacity(items.len());
    while let Some(result) = results.next().await {
        validated.push(result?);
    }
    Ok(validated)
}

/// Reserve each line in order; on the first failure give back what was taken.
///
/// A transport failure leaves the failing line's reservation unknown, so that
/// line is released as well.
async fn reserve_lines(
    inventory: &dyn InventoryClient,
    lines: &[ValidatedLineItem],
) -> AppResult<()> {
    for (index, line) in lines.iter().enumerate() {
        if let Err(err) = inventory.reserve(line.product_id, line.quantity).await {
            tracing::warn!(product_id = line.product_id, error = %err, "reservation failed");
            let taken = match err {
                InventoryError::Unavailable { .. } => index + 1,
                InventoryError::Rejected { .. } => index,
            };
            release_lines(inventory, &lines[..taken]).await;
            return Err(err.into());
        }
    }
    Ok(())
}

async fn release_lines(inventory: &dyn InventoryClient, lines: &[ValidatedLineItem]) {
    for line in lines {
        if let Err(err) = inventory.release(line.product_id, line.quantity).await {
            tracing::error!(
                product_id = line.product_id,
                quantity = line.quantity,
                error = %err,
                "failed to release reserved inventory"
            );
        }
    }
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()?;

    let filter = OrderFilter {
        status,
        sort_order: query.sort_order.unwrap_or_default(),
        limit,
        offset,
    };
    let result = state.store.list_orders(user.user_id, &filter).await?;

    Ok(ApiResponse::success(
        "Ok",
        OrderList {
            items: result.orders,
        },
        Some(Meta::new(page, limit, result.total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: i32,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = state.store.find_order(user.user_id, id).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order not found".into())),
    };

    Ok(ApiResponse::success("OK", order, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: i32,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let status: OrderStatus = payload.status.parse()?;

    let order = state.store.update_status(user.user_id, id, status).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order not found".into())),
    };

    tracing::info!(order_id = order.id, status = %order.status, "order status updated");

    Ok(ApiResponse::success(
        "Order status updated successfully",
        order,
        Some(Meta::empty()),
    ))
}
