//! Catalog lookups against the product service.
//!
//! Every call is a fresh `GET {base}/{product_id}`. There is no cache, retry or
//! circuit breaker; a failing product service fails the order being placed.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use super::{describe_transport_error, join_url};

/// Point-in-time view of a product's price and stock.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub product_id: i32,
    pub name: String,
    pub unit_price: Decimal,
    pub available_stock: i32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Product {0} not found")]
    NotFound(i32),

    #[error("Catalog service unavailable while validating product {product_id}")]
    Unavailable { product_id: i32, reason: String },
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch(&self, product_id: i32) -> Result<CatalogSnapshot, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    product: ProductDto,
}

#[derive(Debug, Deserialize)]
struct ProductDto {
    id: i32,
    name: String,
    price: Decimal,
    stock_quantity: i32,
}

impl From<ProductDto> for CatalogSnapshot {
    fn from(dto: ProductDto) -> Self {
        Self {
            product_id: dto.id,
            name: dto.name,
            unit_price: dto.price,
            available_stock: dto.stock_quantity,
        }
    }
}

pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch(&self, product_id: i32) -> Result<CatalogSnapshot, CatalogError> {
        let unavailable = |reason: String| {
            tracing::warn!(product_id, %reason, "catalog lookup failed");
            CatalogError::Unavailable { product_id, reason }
        };

        let url = join_url(&self.base_url, &product_id.to_string());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(describe_transport_error(&e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(product_id)),
            status if !status.is_success() => {
                return Err(unavailable(format!("status {}", status.as_u16())));
            }
            _ => {}
        }

        let envelope: ProductEnvelope = response
            .json()
            .await
            .map_err(|e| unavailable(describe_transport_error(&e)))?;
        if envelope.product.id != product_id {
            return Err(unavailable(format!(
                "asked for product {product_id}, got {}",
                envelope.product.id
            )));
        }

        let price = envelope.product.price;
        let unit_price = cent_price(price)
            .ok_or_else(|| unavailable(format!("price {price} is finer than whole cents")))?;

        Ok(CatalogSnapshot {
            unit_price,
            ..CatalogSnapshot::from(envelope.product)
        })
    }
}

/// `price` at cent scale, or `None` when storing it would round it.
fn cent_price(price: Decimal) -> Option<Decimal> {
    (price.normalize().scale() <= 2).then(|| price.round_dp(2))
}
