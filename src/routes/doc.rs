use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::orders::{OrderCreate, OrderLineRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    error::ErrorData,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::{health, orders, params},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
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

#[derive(OpenApi)]
#[openapi(
    info(title = "Order Service", description = "Order processing and management"),
    paths(
        health::health_check,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order_status,
    ),
    components(
        schemas(
            Order,
            OrderItem,
            OrderStatus,
            OrderCreate,
            OrderLineRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            params::SortOrder,
            health::HealthData,
            ErrorData,
            Meta,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Order>,
            ApiResponse<ErrorData>,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Orders", description = "Order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
