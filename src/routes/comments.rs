use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::{Comment, LikeTarget};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::thread::Threaded;
use crate::state::AppState;

// --- View structs ---

#[derive(Debug, Clone, Serialize)]
pub struct AuthorView {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: String,
    #[serde(skip)]
    pub parent_id: Option<String>,
    pub author: AuthorView,
    pub content: String,
    pub like_count: i64,
    pub is_liked: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl CommentView {
    pub fn from_comment(comment: Comment, author: AuthorView, is_liked: bool) -> Self {
        Self {
            id: comment.id,
            parent_id: comment.parent_id,
            author,
            content: comment.content,
            like_count: comment.like_count,
            is_liked,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

impl Threaded for CommentView {
    fn thread_id(&self) -> &str {
        &self.id
    }

    fn thread_parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }
}

// --- Request bodies ---

#[derive(Deserialize)]
pub struct CreateCommentBody {
    pub post_id: String,
    pub parent_id: Option<String>,
    pub content: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/comments", post(create_comment))
        .route("/api/comments/{id}", delete(delete_comment))
        .route("/api/comments/{id}/like", post(like_comment))
}

// --- Handlers ---

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateCommentBody>,
) -> AppResult<Response> {
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    if content.len() > state.config.feed.max_comment_length {
        return Err(AppError::BadRequest(format!(
            "Comment must be {} characters or less",
            state.config.feed.max_comment_length
        )));
    }

    let comment = state
        .ledger
        .create_comment(&user.id, &body.post_id, body.parent_id.as_deref(), &content)
        .await?;

    let view = CommentView::from_comment(
        comment,
        AuthorView {
            id: user.id,
            username: user.username,
        },
        false,
    );

    Ok((StatusCode::CREATED, Json(view)).into_response())
}

async fn like_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let target = LikeTarget::Comment(id);
    let like_state = state.ledger.toggle_like(&user.id, &target).await?;
    Ok(Json(like_state).into_response())
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.ledger.remove_comment(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
