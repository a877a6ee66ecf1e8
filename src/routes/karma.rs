use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Duration;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::karma;
use crate::routes::comments::AuthorView;
use crate::state::AppState;

// --- View structs ---

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub username: String,
    pub karma_24h: i64,
}

#[derive(Debug, Serialize)]
pub struct UserKarmaView {
    pub user: AuthorView,
    pub karma_24h: i64,
    pub total_karma: i64,
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/users/me/karma", get(my_karma))
        .route("/api/users/{id}/karma", get(user_karma))
}

// --- Handlers ---

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Json<Vec<LeaderboardEntry>>> {
    let limit = query
        .limit
        .unwrap_or(state.config.feed.leaderboard_limit)
        .clamp(1, 100);
    let window = Duration::hours(state.config.feed.karma_window_hours);

    let rows = karma::leaderboard(&state.db, window, limit)?;
    let entries = rows
        .into_iter()
        .map(|row| LeaderboardEntry {
            user_id: row.user_id,
            username: row.username,
            karma_24h: row.karma,
        })
        .collect();

    Ok(Json(entries))
}

async fn my_karma(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<UserKarmaView>> {
    karma_view(
        &state,
        AuthorView {
            id: user.id,
            username: user.username,
        },
    )
}

async fn user_karma(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserKarmaView>> {
    let conn = state.db.get()?;
    let author = conn
        .query_row(
            "SELECT id, username FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(AuthorView {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound,
            e => AppError::Database(e),
        })?;

    karma_view(&state, author)
}

fn karma_view(state: &AppState, user: AuthorView) -> AppResult<Json<UserKarmaView>> {
    let window = Duration::hours(state.config.feed.karma_window_hours);
    let karma_24h = karma::user_karma(&state.db, &user.id, window)?;
    let total_karma = karma::user_karma_total(&state.db, &user.id)?;

    Ok(Json(UserKarmaView {
        user,
        karma_24h,
        total_karma,
    }))
}
