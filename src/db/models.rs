use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub like_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub target_kind: String,
    pub target_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KarmaEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub source_id: String,
    pub points: i64,
    pub created_at: String,
}

/// The post or comment a like refers to. Dispatching on the variant keeps
/// reward points, event type, and counter table in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeTarget {
    Post(String),
    Comment(String),
}

impl LikeTarget {
    pub fn id(&self) -> &str {
        match self {
            LikeTarget::Post(id) | LikeTarget::Comment(id) => id,
        }
    }

    /// Discriminant stored in likes.target_kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LikeTarget::Post(_) => "post",
            LikeTarget::Comment(_) => "comment",
        }
    }

    /// Karma awarded to the liked content's author.
    pub fn points(&self) -> i64 {
        match self {
            LikeTarget::Post(_) => 5,
            LikeTarget::Comment(_) => 1,
        }
    }

    /// Discriminant stored in karma_events.event_type.
    pub fn event_type(&self) -> &'static str {
        match self {
            LikeTarget::Post(_) => "POST_LIKE",
            LikeTarget::Comment(_) => "COMMENT_LIKE",
        }
    }
}
