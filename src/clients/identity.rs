//! Caller identity checks.
//!
//! The default verifier asks the user service who owns a bearer token. The JWT
//! verifier checks the user service's HS256 tokens locally with the shared
//! secret, trading revocation for one less network hop.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{describe_transport_error, join_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub email: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Claims carried by tokens the user service issues.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i32,
    pub email: String,
    pub exp: usize,
}

pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let decoded = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| IdentityError::Rejected(e.to_string()))?;
        Ok(Identity {
            user_id: decoded.claims.user_id,
            email: decoded.claims.email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    user: ProfileDto,
}

#[derive(Debug, Deserialize)]
struct ProfileDto {
    id: i32,
    email: String,
}

pub struct RemoteIdentityVerifier {
    client: Client,
    base_url: String,
}

impl RemoteIdentityVerifier {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for RemoteIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let response = self
            .client
            .get(join_url(&self.base_url, "profile"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Rejected(format!("status {}", status.as_u16())));
        }

        let profile: ProfileEnvelope = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(describe_transport_error(&e)))?;

        Ok(Identity {
            user_id: profile.user.id,
            email: profile.user.email,
        })
    }
}
