use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::extractor::AuthUser;
use crate::db::PostStore;
use crate::error::AppError;
use crate::models::Post;
use crate::routes::auth::confirmed_user;
use crate::state::SharedState;

pub const MAX_BODY_LEN: usize = 10_000;

#[derive(Deserialize)]
pub struct CreatePost {
    pub body: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub author_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Post>>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let posts = state.posts.list(params.author_id, limit).await?;
    Ok(Json(posts))
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(req): Json<CreatePost>,
) -> Result<Json<Post>, AppError> {
    let user = confirmed_user(&state, &auth).await?;

    let body = req.body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Post body must not be empty".to_string()));
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(AppError::BadRequest(format!(
            "Post body must be at most {MAX_BODY_LEN} characters"
        )));
    }

    let post = state.posts.insert(user.id, body).await?;
    tracing::info!(user_id = user.id, post_id = post.id, "Post created");
    Ok(Json(post))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, AppError> {
    let post = state
        .posts
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    Ok(Json(post))
}
