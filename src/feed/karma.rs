//! Windowed karma aggregation over the append-only karma_events ledger.
//!
//! No per-user total is stored anywhere; every figure here is recomputed
//! from the ledger, and each function is a single SQL aggregation — the
//! store does the summing, never application code.

use chrono::{Duration, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::error::AppError;
use crate::state::DbPool;

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub username: String,
    pub karma: i64,
}

/// Lower bound of the trailing window in the store's timestamp format.
/// `datetime('now')` text compares lexicographically in chronological order.
fn window_cutoff(window: Duration) -> String {
    (Utc::now() - window).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Karma a user earned inside the trailing window. 0 when no events qualify.
pub fn user_karma(pool: &DbPool, user_id: &str, window: Duration) -> Result<i64, AppError> {
    let conn = pool.get()?;
    let total = conn.query_row(
        "SELECT COALESCE(SUM(points), 0) FROM karma_events
         WHERE user_id = ?1 AND created_at >= ?2",
        params![user_id, window_cutoff(window)],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// All-time karma for a user, straight off the ledger.
pub fn user_karma_total(pool: &DbPool, user_id: &str) -> Result<i64, AppError> {
    let conn = pool.get()?;
    let total = conn.query_row(
        "SELECT COALESCE(SUM(points), 0) FROM karma_events WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Top users by karma earned inside the trailing window.
///
/// One grouped aggregation: filter by window, group by recipient, sum, order
/// descending. Users with no qualifying events are absent rather than
/// zero-padded. Ties order by ascending user id (UUIDv7, so account-creation
/// order) to keep the result deterministic.
pub fn leaderboard(
    pool: &DbPool,
    window: Duration,
    limit: i64,
) -> Result<Vec<LeaderboardRow>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT k.user_id, u.username, SUM(k.points) AS karma
         FROM karma_events k
         JOIN users u ON u.id = k.user_id
         WHERE k.created_at >= ?1
         GROUP BY k.user_id
         ORDER BY karma DESC, k.user_id ASC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![window_cutoff(window), limit], |row| {
            Ok(LeaderboardRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                karma: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::params;
    use tempfile::TempDir;

    fn test_pool() -> (DbPool, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (pool, tmp)
    }

    fn insert_user(pool: &DbPool, id: &str, username: &str) {
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)",
                params![id, username],
            )
            .unwrap();
    }

    fn insert_event(pool: &DbPool, user_id: &str, points: i64, age: &str) {
        let id = uuid::Uuid::now_v7().to_string();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO karma_events (id, user_id, event_type, source_id, points, created_at)
                 VALUES (?1, ?2, 'POST_LIKE', 'src', ?3, datetime('now', ?4))",
                params![id, user_id, points, age],
            )
            .unwrap();
    }

    #[test]
    fn user_karma_is_zero_without_events() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u1", "alice");
        assert_eq!(user_karma(&pool, "u1", Duration::hours(24)).unwrap(), 0);
        assert_eq!(user_karma_total(&pool, "u1").unwrap(), 0);
    }

    #[test]
    fn user_karma_sums_events_inside_window() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u1", "alice");
        insert_event(&pool, "u1", 5, "-1 hours");
        insert_event(&pool, "u1", 1, "-2 hours");
        assert_eq!(user_karma(&pool, "u1", Duration::hours(24)).unwrap(), 6);
    }

    #[test]
    fn user_karma_excludes_events_outside_window() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u1", "alice");
        insert_event(&pool, "u1", 5, "-25 hours");
        insert_event(&pool, "u1", 1, "-1 hours");
        assert_eq!(user_karma(&pool, "u1", Duration::hours(24)).unwrap(), 1);
        // The all-time total still sees both
        assert_eq!(user_karma_total(&pool, "u1").unwrap(), 6);
    }

    #[test]
    fn leaderboard_orders_by_karma_descending() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u1", "alice");
        insert_user(&pool, "u2", "bob");
        insert_user(&pool, "u3", "carol");
        insert_event(&pool, "u1", 5, "-1 hours");
        insert_event(&pool, "u2", 5, "-1 hours");
        insert_event(&pool, "u2", 5, "-2 hours");
        insert_event(&pool, "u3", 1, "-1 hours");

        let rows = leaderboard(&pool, Duration::hours(24), 5).unwrap();
        let got: Vec<(&str, i64)> = rows
            .iter()
            .map(|r| (r.username.as_str(), r.karma))
            .collect();
        assert_eq!(got, vec![("bob", 10), ("alice", 5), ("carol", 1)]);
    }

    #[test]
    fn leaderboard_breaks_ties_by_ascending_user_id() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u-a", "alice");
        insert_user(&pool, "u-b", "bob");
        insert_event(&pool, "u-b", 5, "-1 hours");
        insert_event(&pool, "u-a", 5, "-1 hours");

        let rows = leaderboard(&pool, Duration::hours(24), 5).unwrap();
        assert_eq!(rows[0].user_id, "u-a");
        assert_eq!(rows[1].user_id, "u-b");
    }

    #[test]
    fn leaderboard_respects_limit() {
        let (pool, _tmp) = test_pool();
        for i in 0..4 {
            let id = format!("u{}", i);
            insert_user(&pool, &id, &format!("user{}", i));
            insert_event(&pool, &id, 5 - i, "-1 hours");
        }
        let rows = leaderboard(&pool, Duration::hours(24), 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].username, "user0");
        assert_eq!(rows[1].username, "user1");
    }

    #[test]
    fn leaderboard_excludes_stale_events() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u1", "alice");
        insert_user(&pool, "u2", "bob");
        insert_event(&pool, "u1", 5, "-25 hours");
        insert_event(&pool, "u2", 5, "-1 hours");

        let rows = leaderboard(&pool, Duration::hours(24), 5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "bob");
    }

    #[test]
    fn leaderboard_is_empty_without_qualifying_events() {
        let (pool, _tmp) = test_pool();
        insert_user(&pool, "u1", "alice");
        let rows = leaderboard(&pool, Duration::hours(24), 5).unwrap();
        assert!(rows.is_empty());
    }
}
