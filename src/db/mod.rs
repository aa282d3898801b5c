pub mod memory;
pub mod posts;
pub mod users;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{NewUser, Post, User};

pub use memory::{MemoryPostStore, MemoryUserStore};
pub use posts::PgPostStore;
pub use users::PgUserStore;

/// Durable, uniquely-keyed user storage.
///
/// Every mutating call is committed before it returns. Email uniqueness is
/// enforced here and reported as [`AppError::Conflict`].
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user and return it with its assigned id.
    async fn insert(&self, user: NewUser) -> Result<User, AppError>;
    async fn get(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Write back every mutable field of an existing user.
    async fn save(&self, user: &User) -> Result<(), AppError>;
    async fn delete(&self, id: i64) -> Result<(), AppError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, author_id: i64, body: &str) -> Result<Post, AppError>;
    async fn get(&self, id: i64) -> Result<Option<Post>, AppError>;
    /// Newest first, at most `limit` posts, optionally from one author only.
    async fn list(&self, author_id: Option<i64>, limit: i64) -> Result<Vec<Post>, AppError>;
}
