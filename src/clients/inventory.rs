use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

use super::{describe_transport_error, join_url};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Could not reserve inventory for product {product_id}: {reason}")]
    Rejected { product_id: i32, reason: String },

    #[error("Inventory service unavailable while reserving product {product_id}")]
    Unavailable { product_id: i32, reason: String },
}

/// Reserve/release calls against the inventory service.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn reserve(&self, product_id: i32, quantity: i32) -> Result<(), InventoryError>;
    async fn release(&self, product_id: i32, quantity: i32) -> Result<(), InventoryError>;
}

#[derive(Serialize)]
struct QuantityBody {
    quantity: i32,
}

pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn post(&self, product_id: i32, action: &str, quantity: i32) -> Result<(), InventoryError> {
        let path = format!("api/inventory/{product_id}/{action}");
        let response = self
            .client
            .post(join_url(&self.base_url, &path))
            .json(&QuantityBody { quantity })
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable {
                product_id,
                reason: describe_transport_error(&e),
            })?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Err(InventoryError::Rejected {
                product_id,
                reason: "insufficient inventory".into(),
            }),
            StatusCode::NOT_FOUND => Err(InventoryError::Rejected {
                product_id,
                reason: "no inventory record".into(),
            }),
            other => Err(InventoryError::Unavailable {
                product_id,
                reason: format!("status {}", other.as_u16()),
            }),
        }
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn reserve(&self, product_id: i32, quantity: i32) -> Result<(), InventoryError> {
        self.post(product_id, "reserve", quantity).await
    }

    async fn release(&self, product_id: i32, quantity: i32) -> Result<(), InventoryError> {
        self.post(product_id, "release", quantity).await
    }
}
