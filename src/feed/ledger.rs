//! Engagement ledger: keeps likes, denormalized counters, and karma events
//! mutually consistent. Every mutation runs as one transaction — the like
//! row, the counter move, and the karma event commit or roll back together.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::models::{Comment, LikeTarget};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

/// Like state after a mutation, as returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

/// All engagement mutations. Reads (feeds, forests, aggregates) live
/// elsewhere; this trait owns everything that moves a counter or the ledger.
#[async_trait]
pub trait EngagementLedger: Send + Sync {
    /// Record a like. Idempotent: a duplicate (including a lost race against
    /// a concurrent insert) is reported as success without a second karma
    /// event.
    async fn create_like(
        &self,
        user_id: &str,
        target: &LikeTarget,
    ) -> Result<LikeState, LedgerError>;

    /// Remove a like. Idempotent no-op when no like exists.
    async fn remove_like(
        &self,
        user_id: &str,
        target: &LikeTarget,
    ) -> Result<LikeState, LedgerError>;

    /// Like if not yet liked, unlike otherwise.
    async fn toggle_like(
        &self,
        user_id: &str,
        target: &LikeTarget,
    ) -> Result<LikeState, LedgerError>;

    /// Create a comment or reply and bump the post's comment counter in the
    /// same transaction.
    async fn create_comment(
        &self,
        user_id: &str,
        post_id: &str,
        parent_id: Option<&str>,
        content: &str,
    ) -> Result<Comment, LedgerError>;

    /// Delete a comment (author only; replies cascade) and decrement the
    /// post's comment counter.
    async fn remove_comment(&self, user_id: &str, comment_id: &str) -> Result<(), LedgerError>;
}

/// SQLite implementation. BEGIN IMMEDIATE serializes writers, and counter
/// math happens in SQL expressions against the stored value, so concurrent
/// mutations of the same target never lose an update.
pub struct SqliteEngagementLedger {
    pool: DbPool,
}

impl SqliteEngagementLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn in_txn<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    conn.execute("BEGIN IMMEDIATE", [])?;
    match f(conn) {
        Ok(value) => {
            conn.execute("COMMIT", [])?;
            Ok(value)
        }
        Err(e) => {
            conn.execute("ROLLBACK", [])?;
            Err(e)
        }
    }
}

/// Resolve the liked object's author, or NotFound.
fn target_author(conn: &Connection, target: &LikeTarget) -> Result<String, LedgerError> {
    let sql = match target {
        LikeTarget::Post(_) => "SELECT user_id FROM posts WHERE id = ?1",
        LikeTarget::Comment(_) => "SELECT user_id FROM comments WHERE id = ?1",
    };
    match conn.query_row(sql, params![target.id()], |row| row.get(0)) {
        Ok(author) => Ok(author),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(LedgerError::NotFound(format!(
            "{} {}",
            target.kind(),
            target.id()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn like_count(conn: &Connection, target: &LikeTarget) -> Result<i64, LedgerError> {
    let sql = match target {
        LikeTarget::Post(_) => "SELECT like_count FROM posts WHERE id = ?1",
        LikeTarget::Comment(_) => "SELECT like_count FROM comments WHERE id = ?1",
    };
    Ok(conn.query_row(sql, params![target.id()], |row| row.get(0))?)
}

fn like_exists(conn: &Connection, user_id: &str, target: &LikeTarget) -> Result<bool, LedgerError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM likes
         WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3",
        params![user_id, target.kind(), target.id()],
        |row| row.get(0),
    )?)
}

/// Insert the like row; on actual insertion, move the counter and append the
/// karma event crediting the content's author. Returns false when the like
/// already existed (unique constraint absorbed the insert).
fn insert_like(
    conn: &Connection,
    user_id: &str,
    target: &LikeTarget,
    author: &str,
) -> Result<bool, LedgerError> {
    let like_id = uuid::Uuid::now_v7().to_string();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO likes (id, user_id, target_kind, target_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![like_id, user_id, target.kind(), target.id()],
    )? > 0;

    if inserted {
        let increment = match target {
            LikeTarget::Post(_) => "UPDATE posts SET like_count = like_count + 1 WHERE id = ?1",
            LikeTarget::Comment(_) => {
                "UPDATE comments SET like_count = like_count + 1 WHERE id = ?1"
            }
        };
        conn.execute(increment, params![target.id()])?;

        let event_id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO karma_events (id, user_id, event_type, source_id, points)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event_id,
                author,
                target.event_type(),
                target.id(),
                target.points()
            ],
        )?;
    }

    Ok(inserted)
}

/// Delete the like row; on actual deletion, move the counter (floored at
/// zero) and remove the matching karma event. Returns false when no like
/// existed.
fn delete_like(
    conn: &Connection,
    user_id: &str,
    target: &LikeTarget,
    author: &str,
) -> Result<bool, LedgerError> {
    let removed = conn.execute(
        "DELETE FROM likes WHERE user_id = ?1 AND target_kind = ?2 AND target_id = ?3",
        params![user_id, target.kind(), target.id()],
    )? > 0;

    if removed {
        let decrement = match target {
            LikeTarget::Post(_) => {
                "UPDATE posts SET like_count = like_count - 1 WHERE id = ?1 AND like_count > 0"
            }
            LikeTarget::Comment(_) => {
                "UPDATE comments SET like_count = like_count - 1 WHERE id = ?1 AND like_count > 0"
            }
        };
        // Zero rows means the counter was already at zero: ledger drift.
        // Clamp silently for the caller but leave a trace.
        if conn.execute(decrement, params![target.id()])? == 0 {
            tracing::warn!(
                kind = target.kind(),
                target_id = target.id(),
                "like counter underflow clamped at zero"
            );
        }

        conn.execute(
            "DELETE FROM karma_events
             WHERE user_id = ?1 AND event_type = ?2 AND source_id = ?3",
            params![author, target.event_type(), target.id()],
        )?;
    }

    Ok(removed)
}

fn read_comment(conn: &Connection, comment_id: &str) -> Result<Comment, LedgerError> {
    Ok(conn.query_row(
        "SELECT id, post_id, user_id, parent_id, content, like_count, created_at, updated_at
         FROM comments WHERE id = ?1",
        params![comment_id],
        |row| {
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                user_id: row.get(2)?,
                parent_id: row.get(3)?,
                content: row.get(4)?,
                like_count: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        },
    )?)
}

#[async_trait]
impl EngagementLedger for SqliteEngagementLedger {
    async fn create_like(
        &self,
        user_id: &str,
        target: &LikeTarget,
    ) -> Result<LikeState, LedgerError> {
        let conn = self.pool.get()?;
        in_txn(&conn, |conn| {
            let author = target_author(conn, target)?;
            insert_like(conn, user_id, target, &author)?;
            Ok(LikeState {
                liked: true,
                like_count: like_count(conn, target)?,
            })
        })
    }

    async fn remove_like(
        &self,
        user_id: &str,
        target: &LikeTarget,
    ) -> Result<LikeState, LedgerError> {
        let conn = self.pool.get()?;
        in_txn(&conn, |conn| {
            let author = target_author(conn, target)?;
            delete_like(conn, user_id, target, &author)?;
            Ok(LikeState {
                liked: false,
                like_count: like_count(conn, target)?,
            })
        })
    }

    async fn toggle_like(
        &self,
        user_id: &str,
        target: &LikeTarget,
    ) -> Result<LikeState, LedgerError> {
        let conn = self.pool.get()?;
        in_txn(&conn, |conn| {
            let author = target_author(conn, target)?;
            let liked = if like_exists(conn, user_id, target)? {
                delete_like(conn, user_id, target, &author)?;
                false
            } else {
                insert_like(conn, user_id, target, &author)?;
                true
            };
            Ok(LikeState {
                liked,
                like_count: like_count(conn, target)?,
            })
        })
    }

    async fn create_comment(
        &self,
        user_id: &str,
        post_id: &str,
        parent_id: Option<&str>,
        content: &str,
    ) -> Result<Comment, LedgerError> {
        let conn = self.pool.get()?;
        in_txn(&conn, |conn| {
            let post_exists: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
                params![post_id],
                |row| row.get(0),
            )?;
            if !post_exists {
                return Err(LedgerError::NotFound(format!("post {}", post_id)));
            }

            if let Some(parent) = parent_id {
                let parent_post: String = match conn.query_row(
                    "SELECT post_id FROM comments WHERE id = ?1",
                    params![parent],
                    |row| row.get(0),
                ) {
                    Ok(p) => p,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(LedgerError::NotFound(format!("comment {}", parent)));
                    }
                    Err(e) => return Err(e.into()),
                };
                if parent_post != post_id {
                    return Err(LedgerError::InvalidParent(
                        "Parent comment must belong to the same post".into(),
                    ));
                }
            }

            let comment_id = uuid::Uuid::now_v7().to_string();
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, parent_id, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![comment_id, post_id, user_id, parent_id, content],
            )?;

            // Atomic increment against the stored value; safe under
            // concurrent comment creation on the same post.
            conn.execute(
                "UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?1",
                params![post_id],
            )?;

            // Read back so timestamps come from the store
            read_comment(conn, &comment_id)
        })
    }

    async fn remove_comment(&self, user_id: &str, comment_id: &str) -> Result<(), LedgerError> {
        let conn = self.pool.get()?;
        in_txn(&conn, |conn| {
            let (post_id, author): (String, String) = match conn.query_row(
                "SELECT post_id, user_id FROM comments WHERE id = ?1",
                params![comment_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            ) {
                Ok(found) => found,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(LedgerError::NotFound(format!("comment {}", comment_id)));
                }
                Err(e) => return Err(e.into()),
            };

            if author != user_id {
                return Err(LedgerError::Forbidden(
                    "Only the comment author can delete it".into(),
                ));
            }

            conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
            conn.execute(
                "UPDATE posts SET comment_count = comment_count - 1 WHERE id = ?1",
                params![post_id],
            )?;

            Ok(())
        })
    }
}
