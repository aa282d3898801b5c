use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use crate::auth::token::Purpose;
use crate::error::AppError;
use crate::state::SharedState;

pub const SESSION_COOKIE: &str = "access_token";

/// The caller behind a valid session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
}

impl AuthUser {
    fn from_token(token: &str, state: &SharedState) -> Result<Self, AppError> {
        let claims = state
            .accounts
            .codec()
            .decode(token, state.config.session_max_age)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        if claims.purpose != Purpose::Session {
            return Err(AppError::Unauthorized(
                "Session token required".to_string(),
            ));
        }

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        // Try Bearer token from Authorization header first
        if let Some(auth_header) = parts.headers.get("authorization") {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return AuthUser::from_token(token, state);
            }
        }

        // Try cookie-based auth
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            return AuthUser::from_token(cookie.value(), state);
        }

        Err(AppError::Unauthorized(
            "Missing authentication token".to_string(),
        ))
    }
}
