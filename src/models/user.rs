use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::password;

/// A registered account.
///
/// The credential is write-only: it can be set and checked, but neither the
/// plaintext nor the hash is ever handed back out of the crate.
#[derive(Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    password_hash: Option<String>,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn set_password(&mut self, plaintext: &str) -> Result<(), String> {
        self.password_hash = Some(password::hash(plaintext)?);
        Ok(())
    }

    /// False when no password was ever set, or the stored hash is unreadable.
    pub fn verify_password(&self, plaintext: &str) -> bool {
        match &self.password_hash {
            Some(hash) => password::verify(plaintext, hash).unwrap_or_else(|e| {
                tracing::warn!(user_id = self.id, "Stored password hash rejected: {e}");
                false
            }),
            None => false,
        }
    }

    pub(crate) fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub(crate) fn from_new(id: i64, new: NewUser, created_at: DateTime<Utc>) -> Self {
        User {
            id,
            email: new.email,
            password_hash: new.password_hash,
            confirmed: false,
            created_at,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "[redacted]"))
            .field("confirmed", &self.confirmed)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A user that has not been stored yet, so has no id.
#[derive(Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    password_hash: Option<String>,
}

impl NewUser {
    pub fn new(email: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_string),
            password_hash: None,
        }
    }

    pub fn with_password(mut self, plaintext: &str) -> Result<Self, String> {
        self.password_hash = Some(password::hash(plaintext)?);
        Ok(self)
    }

    pub(crate) fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_password(id: i64, plaintext: &str) -> User {
        let new = NewUser::new(None).with_password(plaintext).unwrap();
        User::from_new(id, new, Utc::now())
    }

    #[test]
    fn setting_a_password_stores_a_hash() {
        let u = user_with_password(1, "cat");
        assert!(u.password_hash().is_some());
        assert!(!u.password_hash().unwrap().is_empty());
        assert_ne!(u.password_hash(), Some("cat"));
    }

    #[test]
    fn verification_matches_only_the_set_password() {
        let u = user_with_password(1, "cat");
        assert!(u.verify_password("cat"));
        assert!(!u.verify_password("dog"));
    }

    #[test]
    fn salts_differ_between_users() {
        let u1 = user_with_password(1, "cat");
        let u2 = user_with_password(2, "cat");
        assert_ne!(u1.password_hash(), u2.password_hash());
    }

    #[test]
    fn resetting_the_same_password_changes_the_hash() {
        let mut u = user_with_password(1, "cat");
        let before = u.password_hash().map(str::to_string);
        u.set_password("cat").unwrap();
        assert_ne!(u.password_hash().map(str::to_string), before);
        assert!(u.verify_password("cat"));
    }

    #[test]
    fn user_without_password_never_verifies() {
        let u = User::from_new(1, NewUser::new(Some("a@x.com")), Utc::now());
        assert!(u.password_hash().is_none());
        assert!(!u.verify_password(""));
        assert!(!u.verify_password("cat"));
    }

    #[test]
    fn new_users_start_unconfirmed() {
        let u = user_with_password(1, "cat");
        assert!(!u.confirmed);
    }

    #[test]
    fn credential_never_leaks_through_serialization() {
        let u = user_with_password(1, "cat");
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn credential_never_leaks_through_debug() {
        let u = user_with_password(1, "cat");
        let debug = format!("{u:?}");
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("argon2"));
    }
}
