//! Reconstructs a nested reply forest from a post's flat comment set.
//!
//! The caller loads every comment for one post in a single query, ordered by
//! creation time, and the builder assembles the tree in memory. Two passes,
//! O(n) time and space, no per-node queries.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::Comment;

/// Anything that can hang in a reply tree: an id plus an optional parent id.
pub trait Threaded {
    fn thread_id(&self) -> &str;
    fn thread_parent_id(&self) -> Option<&str>;
}

impl Threaded for Comment {
    fn thread_id(&self) -> &str {
        &self.id
    }

    fn thread_parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }
}

/// A comment (or comment view) with its ordered replies. Depth is assigned
/// during assembly (roots are 0), so no parent-chain walk is ever needed —
/// deriving depth per node by walking parents would be quadratic on deep
/// chains.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub depth: u32,
    pub replies: Vec<ThreadNode<T>>,
}

/// Build the reply forest from comments ordered ascending by creation time.
///
/// Nodes whose parent id is set but not present in `items` are dropped from
/// the output entirely, along with their descendants. They are not promoted
/// to roots: the fetch loads a post's full comment set, so a missing parent
/// means drift, and promotion would mask it.
pub fn build_forest<T: Threaded>(items: Vec<T>) -> Vec<ThreadNode<T>> {
    let index: HashMap<String, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.thread_id().to_string(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut roots: Vec<usize> = Vec::new();

    // Input order is chronological, so child lists and the root list come out
    // chronological too.
    for (i, item) in items.iter().enumerate() {
        match item.thread_parent_id() {
            Some(parent_id) => {
                if let Some(&parent_idx) = index.get(parent_id) {
                    children[parent_idx].push(i);
                }
                // Parent outside the set: excluded from the forest.
            }
            None => roots.push(i),
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();

    roots
        .into_iter()
        .filter_map(|root| assemble(root, 0, &children, &mut slots))
        .collect()
}

fn assemble<T>(
    idx: usize,
    depth: u32,
    children: &[Vec<usize>],
    slots: &mut Vec<Option<T>>,
) -> Option<ThreadNode<T>> {
    let item = slots[idx].take()?;
    let replies = children[idx]
        .iter()
        .filter_map(|&child| assemble(child, depth + 1, children, slots))
        .collect();
    Some(ThreadNode {
        item,
        depth,
        replies,
    })
}
