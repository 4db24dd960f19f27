//! Extractor guarding the admin review routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use brandgen_core::error::CoreError;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// A caller allowed to review the request queue: list every user's
/// requests, set statuses by hand, upload results and clear the store.
///
/// Missing or invalid tokens are rejected by [`AuthUser`] with 401; a valid
/// token without the admin role gets 403.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::debug!(user_id = %user.user_id, role = %user.role, "Admin route refused");
            return Err(AppError::Core(CoreError::Forbidden(
                "Reviewing generation requests requires the admin role".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
