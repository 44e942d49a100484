use std::sync::Arc;

use crate::{
    clients::{
        build_http_client,
        catalog::{CatalogClient, HttpCatalogClient},
        identity::{IdentityVerifier, JwtIdentityVerifier, RemoteIdentityVerifier},
        inventory::{HttpInventoryClient, InventoryClient},
    },
    config::{AppConfig, IdentityMode},
    db::{DbPool, orm_from_pool},
    store::{OrderStore, PgOrderStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn CatalogClient>,
    pub identity: Arc<dyn IdentityVerifier>,
    /// Set only when inventory reservation is enabled.
    pub inventory: Option<Arc<dyn InventoryClient>>,
    pub lookup_concurrency: usize,
}

impl AppState {
    /// Wire the production adapters described by `config` around `pool`.
    pub fn from_config(config: &AppConfig, pool: DbPool) -> anyhow::Result<Self> {
        let http = build_http_client(config.http_timeout)?;
        let orm = orm_from_pool(&pool);

        let identity: Arc<dyn IdentityVerifier> = match &config.identity_mode {
            IdentityMode::Remote => Arc::new(RemoteIdentityVerifier::new(
                http.clone(),
                config.user_service_url.clone(),
            )),
            IdentityMode::Jwt { secret } => Arc::new(JwtIdentityVerifier::new(secret)),
        };

        let inventory: Option<Arc<dyn InventoryClient>> = if config.inventory_reservation {
            Some(Arc::new(HttpInventoryClient::new(
                http.clone(),
                config.inventory_service_url.clone(),
            )))
        } else {
            None
        };

        Ok(Self {
            store: Arc::new(PgOrderStore::new(pool, orm)),
            catalog: Arc::new(HttpCatalogClient::new(
                http,
                config.product_service_url.clone(),
            )),
            identity,
            inventory,
            lookup_concurrency: config.catalog_lookup_concurrency.max(1),
        })
    }
}
