use chrono::{DateTime, Utc};
use serde::Serialize;

/// A short Markdown text written by a confirmed user. The body is stored
/// as written; rendering is left to clients.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
