use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::accounts::{is_valid_email, normalize_email, MIN_PASSWORD_LEN};
use crate::auth::extractor::{AuthUser, SESSION_COOKIE};
use crate::db::UserStore;
use crate::error::AppError;
use crate::models::User;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ChangeEmailRequest {
    pub new_email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(msg: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: msg.to_string(),
    })
}

fn session_cookie(token: &str, state: &SharedState) -> CookieJar {
    let max_age = i64::try_from(state.config.session_max_age.as_secs()).unwrap_or(i64::MAX);
    let cookie = Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age))
        .build();
    CookieJar::new().add(cookie)
}

fn clear_session_cookie() -> CookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    CookieJar::new().add(cookie)
}

/// Stand-in for mail delivery: the link a user would have been sent is logged.
fn deliver_link(state: &SharedState, to: &str, subject: &str, path: &str, token: &str) {
    let url = format!("{}{path}?token={token}", state.config.base_url);
    tracing::warn!(to, "Mail delivery not configured. {subject}: {url}");
}

async fn current_user(state: &SharedState, auth: &AuthUser) -> Result<User, AppError> {
    state
        .accounts
        .store()
        .get(auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))
}

/// Routes that change credentials or publish content require a confirmed
/// account.
pub(crate) async fn confirmed_user(state: &SharedState, auth: &AuthUser) -> Result<User, AppError> {
    let user = current_user(state, auth).await?;
    if !user.confirmed {
        return Err(AppError::Forbidden(
            "Account has not been confirmed yet".to_string(),
        ));
    }
    Ok(user)
}

fn check_password_len(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<User>, AppError> {
    let user = state.accounts.register(&req.email, &req.password).await?;

    let token = state.accounts.generate_confirmation_token(&user)?;
    if let Some(email) = &user.email {
        deliver_link(&state, email, "Confirm your account", "/auth/confirm", &token);
    }

    Ok(Json(user))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let email = normalize_email(&req.email);
    if state.login_limiter.check(&email).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let Some(user) = state.accounts.authenticate(&email, &req.password).await? else {
        state.login_limiter.record_failure(&email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };
    state.login_limiter.reset(&email);

    let access_token = state.accounts.generate_session_token(&user)?;
    tracing::info!(user_id = user.id, "User logged in");

    let jar = session_cookie(&access_token, &state);
    Ok((jar, Json(AuthResponse { access_token })))
}

pub async fn logout() -> (CookieJar, Json<MessageResponse>) {
    (clear_session_cookie(), message("Logged out successfully"))
}

pub async fn me(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    Ok(Json(current_user(&state, &auth).await?))
}

pub async fn confirm(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<TokenRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let mut user = current_user(&state, &auth).await?;

    if !state.accounts.confirm(&mut user, &req.token, None).await? {
        return Err(AppError::BadRequest(
            "The confirmation link is invalid or has expired".to_string(),
        ));
    }

    Ok(message("You have confirmed your account"))
}

pub async fn resend_confirmation(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    let user = current_user(&state, &auth).await?;
    if user.confirmed {
        return Ok(message("Account is already confirmed"));
    }

    let token = state.accounts.generate_confirmation_token(&user)?;
    if let Some(email) = &user.email {
        deliver_link(&state, email, "Confirm your account", "/auth/confirm", &token);
    }

    Ok(message("A new confirmation link has been sent"))
}

pub async fn forgot_password(
    State(state): State<SharedState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    // Same answer whether or not the email exists
    let response = message("If that email is registered, a reset link has been sent.");

    let email = normalize_email(&req.email);
    if let Some(user) = state.accounts.store().find_by_email(&email).await? {
        let token = state.accounts.generate_reset_token(&user)?;
        deliver_link(&state, &email, "Reset your password", "/auth/reset", &token);
    }

    Ok(response)
}

pub async fn reset_password(
    State(state): State<SharedState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    check_password_len(&req.password)?;

    if !state
        .accounts
        .reset_password(&req.token, &req.password, None)
        .await?
    {
        return Err(AppError::BadRequest(
            "Invalid or expired reset token".to_string(),
        ));
    }

    Ok(message("Password reset successfully"))
}

pub async fn change_password(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    check_password_len(&req.new_password)?;
    let mut user = confirmed_user(&state, &auth).await?;

    if !state
        .accounts
        .change_password(&mut user, &req.current_password, &req.new_password)
        .await?
    {
        return Err(AppError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    Ok(message("Password changed successfully"))
}

pub async fn request_email_change(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<ChangeEmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = confirmed_user(&state, &auth).await?;

    if !user.verify_password(&req.password) {
        return Err(AppError::Unauthorized("Invalid password".to_string()));
    }

    let new_email = normalize_email(&req.new_email);
    if !is_valid_email(&new_email) {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if state.accounts.store().find_by_email(&new_email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let token = state.accounts.generate_email_change_token(&user, &new_email)?;
    deliver_link(
        &state,
        &new_email,
        "Confirm your email address",
        "/auth/change-email",
        &token,
    );

    Ok(message("A confirmation link has been sent to the new address"))
}

pub async fn change_email(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<TokenRequest>,
) -> Result<Json<User>, AppError> {
    let mut user = confirmed_user(&state, &auth).await?;

    if !state.accounts.change_email(&mut user, &req.token, None).await? {
        return Err(AppError::BadRequest(
            "The email change link is invalid or has expired".to_string(),
        ));
    }

    Ok(Json(user))
}
