use std::{env, time::Duration};

use anyhow::{Context, bail};

/// How bearer credentials are turned into a caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// Ask the user service's `/profile` endpoint.
    Remote,
    /// Verify HS256 tokens locally with the secret shared with the user service.
    Jwt { secret: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub product_service_url: String,
    pub user_service_url: String,
    pub inventory_service_url: String,
    pub inventory_reservation: bool,
    pub identity_mode: IdentityMode,
    pub http_timeout: Duration,
    pub catalog_lookup_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("APP_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3003);

        let product_service_url = lookup("PRODUCT_SERVICE_URL")
            .unwrap_or_else(|| "http://product-service:3002".to_string());
        let user_service_url =
            lookup("USER_SERVICE_URL").unwrap_or_else(|| "http://user-service:3001".to_string());
        let inventory_service_url = lookup("INVENTORY_SERVICE_URL")
            .unwrap_or_else(|| "http://inventory-service:3005".to_string());

        let inventory_reservation = match lookup("INVENTORY_RESERVATION_ENABLED") {
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("INVENTORY_RESERVATION_ENABLED: invalid value {raw:?}"))?,
            None => false,
        };

        let identity_mode = match lookup("IDENTITY_MODE").as_deref() {
            None | Some("remote") => IdentityMode::Remote,
            Some("jwt") => {
                let secret = lookup("JWT_SECRET")
                    .filter(|s| !s.is_empty())
                    .context("JWT_SECRET is required when IDENTITY_MODE=jwt")?;
                IdentityMode::Jwt { secret }
            }
            Some(other) => bail!("IDENTITY_MODE must be `remote` or `jwt`, got {other:?}"),
        };

        let http_timeout = Duration::from_secs(
            lookup("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(30),
        );
        let catalog_lookup_concurrency = lookup("CATALOG_LOOKUP_CONCURRENCY")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(4)
            .max(1);

        Ok(Self {
            database_url,
            host,
            port,
            product_service_url,
            user_service_url,
            inventory_service_url,
            inventory_reservation,
            identity_mode,
            http_timeout,
            catalog_lookup_concurrency,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
