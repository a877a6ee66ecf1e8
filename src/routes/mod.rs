pub mod comments;
pub mod karma;
pub mod posts;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(posts::router())
        .merge(comments::router())
        .merge(karma::router())
}
