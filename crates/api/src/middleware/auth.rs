//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use brandgen_core::error::CoreError;
use brandgen_core::request::{GenerationRequest, Requester};
use brandgen_core::roles::ROLE_ADMIN;
use brandgen_core::types::UserId;

use crate::auth::jwt::{validate_token, JwtConfig};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
}

impl AuthUser {
    /// Decode a raw token.
    pub fn from_token(token: &str, config: &JwtConfig) -> Result<Self, AppError> {
        let claims = validate_token(token, config).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;
        Ok(Self {
            user_id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Owners and admins may see and act on a request.
    pub fn ensure_can_access(&self, request: &GenerationRequest) -> Result<(), AppError> {
        if self.is_admin() || request.user_id == self.user_id {
            Ok(())
        } else {
            Err(AppError::Core(CoreError::Forbidden(
                "Request belongs to another user".into(),
            )))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        Self::from_token(token, &state.config.jwt)
    }
}
