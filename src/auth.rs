//! Authenticated principals from HS256 bearer tokens.
//!
//! Tokens are issued by the identity service; this crate only verifies them.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MarketError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Customer, Seller, Admin }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal { pub id: Uuid, pub role: Role }

impl Principal {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn require(&self, role: Role) -> Result<()> {
        if self.role == role || self.is_admin() { Ok(()) } else { Err(MarketError::Forbidden) }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(MarketError::Forbidden) }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self { decoding: DecodingKey::from_secret(secret.as_bytes()), encoding: EncodingKey::from_secret(secret.as_bytes()) }
    }

    pub fn verify(&self, token: &str) -> Result<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            MarketError::Unauthorized
        })?;
        Ok(Principal { id: data.claims.sub, role: data.claims.role })
    }

    /// Signs a token for `principal`; used by local tooling and tests.
    pub fn issue(&self, principal: Principal, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims { sub: principal.id, role: principal.role, exp: (now + ttl).timestamp(), iat: now.timestamp() };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| MarketError::Upstream(e.to_string()))
    }

    /// Parses an `Authorization` header value of the form `Bearer <token>`.
    pub fn verify_header(&self, header: &str) -> Result<Principal> {
        let token = header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty()).ok_or(MarketError::Unauthorized)?;
        self.verify(token)
    }
}
