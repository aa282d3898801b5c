//! Account state transitions driven by signed tokens.
//!
//! Every operation that consumes a token answers `Ok(false)` when the token
//! or the requested change is not acceptable, and leaves the user untouched.
//! `Err` is reserved for storage and hashing failures.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::auth::token::{Purpose, TokenClaims, TokenCodec};
use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{NewUser, User};

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 64 && EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn UserStore>,
    codec: TokenCodec,
    default_max_age: Duration,
}

impl Accounts {
    pub fn new(store: Arc<dyn UserStore>, codec: TokenCodec, default_max_age: Duration) -> Self {
        Self {
            store,
            codec,
            default_max_age,
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an unconfirmed account. The email must be well formed and free.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AppError::BadRequest("Invalid email address".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let new = NewUser::new(Some(&email))
            .with_password(password)
            .map_err(AppError::Internal)?;
        let user = self.store.insert(new).await?;
        tracing::info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Look up a user by email and check the password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            return Ok(None);
        };
        Ok(user.verify_password(password).then_some(user))
    }

    pub fn generate_confirmation_token(&self, user: &User) -> Result<String, AppError> {
        self.codec
            .generate(Purpose::Confirm, user.id, None)
            .map_err(AppError::Internal)
    }

    pub fn generate_reset_token(&self, user: &User) -> Result<String, AppError> {
        self.codec
            .generate(Purpose::Reset, user.id, None)
            .map_err(AppError::Internal)
    }

    /// The address is normalized before it is signed, so the token always
    /// carries the form the store compares against.
    pub fn generate_email_change_token(
        &self,
        user: &User,
        new_email: &str,
    ) -> Result<String, AppError> {
        let new_email = normalize_email(new_email);
        if !is_valid_email(&new_email) {
            return Err(AppError::BadRequest("Invalid email address".to_string()));
        }
        self.codec
            .generate(Purpose::ChangeEmail, user.id, Some(&new_email))
            .map_err(AppError::Internal)
    }

    pub fn generate_session_token(&self, user: &User) -> Result<String, AppError> {
        self.codec
            .generate(Purpose::Session, user.id, None)
            .map_err(AppError::Internal)
    }

    /// Mark `user` confirmed. Re-confirming is harmless as long as the token
    /// is still good.
    pub async fn confirm(
        &self,
        user: &mut User,
        token: &str,
        max_age: Option<Duration>,
    ) -> Result<bool, AppError> {
        let Some(claims) = self.claims_for(token, Purpose::Confirm, max_age) else {
            return Ok(false);
        };
        if claims.sub != user.id {
            tracing::debug!(user_id = user.id, token_sub = claims.sub, "Confirmation token for another user");
            return Ok(false);
        }

        user.confirmed = true;
        self.store.save(user).await?;
        tracing::info!(user_id = user.id, "User confirmed");
        Ok(true)
    }

    /// Set a new password for whichever user the token names.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        max_age: Option<Duration>,
    ) -> Result<bool, AppError> {
        let Some(claims) = self.claims_for(token, Purpose::Reset, max_age) else {
            return Ok(false);
        };
        let Some(mut user) = self.store.get(claims.sub).await? else {
            tracing::debug!(token_sub = claims.sub, "Reset token for missing user");
            return Ok(false);
        };

        user.set_password(new_password).map_err(AppError::Internal)?;
        self.store.save(&user).await?;
        tracing::info!(user_id = user.id, "Password reset");
        Ok(true)
    }

    /// Move `user` to the email carried by the token, unless someone else
    /// already owns it.
    pub async fn change_email(
        &self,
        user: &mut User,
        token: &str,
        max_age: Option<Duration>,
    ) -> Result<bool, AppError> {
        let Some(claims) = self.claims_for(token, Purpose::ChangeEmail, max_age) else {
            return Ok(false);
        };
        if claims.sub != user.id {
            tracing::debug!(user_id = user.id, token_sub = claims.sub, "Email change token for another user");
            return Ok(false);
        }
        let Some(new_email) = claims.new_email.as_deref().map(normalize_email) else {
            return Ok(false);
        };
        if !is_valid_email(&new_email) {
            tracing::debug!(user_id = user.id, "Email change token carries an invalid address");
            return Ok(false);
        }
        if let Some(owner) = self.store.find_by_email(&new_email).await? {
            if owner.id != user.id {
                tracing::debug!(user_id = user.id, "Email change target already taken");
                return Ok(false);
            }
        }

        let previous = user.email.replace(new_email);
        match self.store.save(user).await {
            Ok(()) => {
                tracing::info!(user_id = user.id, "Email changed");
                Ok(true)
            }
            // Lost a race for the address between the lookup and the write.
            Err(AppError::Conflict(_)) => {
                user.email = previous;
                Ok(false)
            }
            Err(e) => {
                user.email = previous;
                Err(e)
            }
        }
    }

    /// Replace the password after checking the current one.
    pub async fn change_password(
        &self,
        user: &mut User,
        current_password: &str,
        new_password: &str,
    ) -> Result<bool, AppError> {
        if !user.verify_password(current_password) {
            return Ok(false);
        }
        user.set_password(new_password).map_err(AppError::Internal)?;
        self.store.save(user).await?;
        tracing::info!(user_id = user.id, "Password changed");
        Ok(true)
    }

    fn claims_for(
        &self,
        token: &str,
        purpose: Purpose,
        max_age: Option<Duration>,
    ) -> Option<TokenClaims> {
        let max_age = max_age.unwrap_or(self.default_max_age);
        match self.codec.decode(token, max_age) {
            Ok(claims) if claims.purpose == purpose => Some(claims),
            Ok(claims) => {
                tracing::debug!(expected = ?purpose, got = ?claims.purpose, "Token used for wrong purpose");
                None
            }
            Err(e) => {
                tracing::debug!(purpose = ?purpose, "Token rejected: {e}");
                None
            }
        }
    }
}
