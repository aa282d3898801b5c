use std::cmp::Reverse;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::{PostStore, UserStore};
use crate::error::AppError;
use crate::models::{NewUser, Post, User};

/// In-process user store, used by tests and for running without a database.
pub struct MemoryUserStore {
    users: DashMap<i64, User>,
    /// email -> owning user id
    emails: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.users.len()
    }

    /// Claim `email` for `id`. The shard lock on the entry makes the
    /// check-then-insert atomic.
    fn claim_email(&self, email: &str, id: i64) -> Result<(), AppError> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(owner) if *owner.get() != id => Err(AppError::Conflict(
                "Email is already registered".to_string(),
            )),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(email) = &user.email {
            self.claim_email(email, id)?;
        }
        let user = User::from_new(id, user, Utc::now());
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.emails.get(email).map(|owner| *owner.value()) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn save(&self, user: &User) -> Result<(), AppError> {
        let Some(mut stored) = self.users.get_mut(&user.id) else {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        };

        if stored.email != user.email {
            if let Some(email) = &user.email {
                self.claim_email(email, user.id)?;
            }
            if let Some(old) = &stored.email {
                self.emails.remove_if(old, |_, owner| *owner == user.id);
            }
        }

        *stored = user.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        if let Some((_, user)) = self.users.remove(&id) {
            if let Some(email) = &user.email {
                self.emails.remove_if(email, |_, owner| *owner == id);
            }
        }
        Ok(())
    }
}

/// In-process post store. Authors are not checked against any user store.
pub struct MemoryPostStore {
    posts: DashMap<i64, Post>,
    next_id: AtomicI64,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self {
            posts: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert(&self, author_id: i64, body: &str) -> Result<Post, AppError> {
        let post = Post {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            author_id,
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get(&self, id: i64) -> Result<Option<Post>, AppError> {
        Ok(self.posts.get(&id).map(|p| p.value().clone()))
    }

    async fn list(&self, author_id: Option<i64>, limit: i64) -> Result<Vec<Post>, AppError> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| author_id.is_none_or(|a| p.author_id == a))
            .map(|p| p.value().clone())
            .collect();
        posts.sort_by_key(|p| Reverse((p.created_at, p.id)));
        posts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(posts)
    }
}
