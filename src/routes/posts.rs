use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::models::LikeTarget;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::feed::thread::{build_forest, ThreadNode};
use crate::routes::comments::{AuthorView, CommentView};
use crate::state::AppState;

// --- View structs ---

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: String,
    pub author: AuthorView,
    pub content: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PostWithComments {
    pub post: PostView,
    pub comments: Vec<ThreadNode<CommentView>>,
}

// --- Request bodies ---

#[derive(Deserialize)]
pub struct CreatePostBody {
    pub content: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/{id}/comments", get(post_with_comments))
        .route("/api/posts/{id}/like", post(like_post))
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<Vec<PostView>>> {
    let user_id = user.map(|u| u.id);
    let conn = state.db.get()?;
    let posts = query_posts(&conn, user_id.as_deref())?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreatePostBody>,
) -> AppResult<Response> {
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::BadRequest("Post content cannot be empty".into()));
    }
    if content.len() > state.config.feed.max_post_length {
        return Err(AppError::BadRequest(format!(
            "Post content must be {} characters or less",
            state.config.feed.max_post_length
        )));
    }

    let post_id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO posts (id, user_id, content) VALUES (?1, ?2, ?3)",
        params![post_id, user.id, content],
    )?;

    let view = query_post(&conn, &post_id, Some(&user.id))?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

/// A post together with its full reply forest. The post, its comments, and
/// the caller's like flags each come from one query; the tree is assembled in
/// memory, never by per-node fetches.
async fn post_with_comments(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<PostWithComments>> {
    let user_id = user.map(|u| u.id);
    let conn = state.db.get()?;

    let post = query_post(&conn, &id, user_id.as_deref())?;
    let comments = query_comment_views(&conn, &id, user_id.as_deref())?;

    Ok(Json(PostWithComments {
        post,
        comments: build_forest(comments),
    }))
}

async fn like_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let target = LikeTarget::Post(id);
    let like_state = state.ledger.toggle_like(&user.id, &target).await?;
    Ok(Json(like_state).into_response())
}

// --- Query helpers ---

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.username, p.content, p.like_count, p.comment_count,
        EXISTS(
            SELECT 1 FROM likes l
            WHERE l.target_kind = 'post' AND l.target_id = p.id AND l.user_id = ?1
        ) AS is_liked,
        p.created_at, p.updated_at
 FROM posts p
 JOIN users u ON u.id = p.user_id";

fn row_to_post_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostView> {
    Ok(PostView {
        id: row.get(0)?,
        author: AuthorView {
            id: row.get(1)?,
            username: row.get(2)?,
        },
        content: row.get(3)?,
        like_count: row.get(4)?,
        comment_count: row.get(5)?,
        is_liked: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn query_posts(
    conn: &rusqlite::Connection,
    current_user_id: Option<&str>,
) -> Result<Vec<PostView>, AppError> {
    let uid = current_user_id.unwrap_or("");

    let sql = format!(
        "{} ORDER BY p.created_at DESC, p.id DESC LIMIT 50",
        POST_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params![uid], |row| row_to_post_view(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

fn query_post(
    conn: &rusqlite::Connection,
    post_id: &str,
    current_user_id: Option<&str>,
) -> Result<PostView, AppError> {
    let uid = current_user_id.unwrap_or("");

    let sql = format!("{} WHERE p.id = ?2", POST_SELECT);
    conn.query_row(&sql, params![uid, post_id], |row| row_to_post_view(row))
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound,
            e => e.into(),
        })
}

/// All of a post's comments in creation order, each with its author and the
/// caller's like flag resolved set-wise inside the same statement.
fn query_comment_views(
    conn: &rusqlite::Connection,
    post_id: &str,
    current_user_id: Option<&str>,
) -> Result<Vec<CommentView>, AppError> {
    let uid = current_user_id.unwrap_or("");

    let mut stmt = conn.prepare(
        "SELECT c.id, c.parent_id, c.user_id, u.username, c.content, c.like_count,
                EXISTS(
                    SELECT 1 FROM likes l
                    WHERE l.target_kind = 'comment' AND l.target_id = c.id AND l.user_id = ?2
                ) AS is_liked,
                c.created_at, c.updated_at
         FROM comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;

    let comments = stmt
        .query_map(params![post_id, uid], |row| {
            Ok(CommentView {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                author: AuthorView {
                    id: row.get(2)?,
                    username: row.get(3)?,
                },
                content: row.get(4)?,
                like_count: row.get(5)?,
                is_liked: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(comments)
}
