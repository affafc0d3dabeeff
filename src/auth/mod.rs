//! Caller authentication for the reconcile RPC.
//!
//! Callers present an HS256 bearer token; the extractor rejects requests
//! with no resolvable identity outright.

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::app::AppContext;
use crate::error::{Result, SaucierError};

/// Claims carried in the caller's bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub admin: bool,
    pub exp: usize,
}

/// Authenticated caller identity.
#[derive(Debug, Clone)]
pub struct Caller {
    pub uid: String,
    pub is_admin: bool,
}

impl Caller {
    /// A caller may reconcile their own uid unconditionally; any other uid
    /// requires the administrator claim.
    pub fn authorize_target(&self, target_uid: &str) -> Result<()> {
        if self.uid == target_uid || self.is_admin {
            Ok(())
        } else {
            Err(SaucierError::permission_denied(
                "cannot reconcile another user's entitlement",
            ))
        }
    }
}

impl FromRequestParts<AppContext> for Caller {
    type Rejection = SaucierError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> std::result::Result<Self, Self::Rejection> {
        let secret = state
            .config
            .auth
            .jwt_secret
            .as_ref()
            .ok_or_else(|| SaucierError::failed_precondition("JWT secret is not configured"))?;

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SaucierError::unauthenticated("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| SaucierError::unauthenticated("expected Bearer token"))?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| SaucierError::unauthenticated(format!("invalid token: {e}")))?;

        Ok(Caller {
            uid: data.claims.sub,
            is_admin: data.claims.admin,
        })
    }
}
