//! Turns a flat comment collection into nested reply trees.
//!
//! Stored records are never touched: the tree is built as fresh value nodes
//! from a parent -> children adjacency map over the whole collection, so a
//! paginated entry point always gets its complete subtree attached.

use std::collections::{HashMap, HashSet};

use crate::model::{Comment, CommentId, CommentNode};

/// Newest first. `sort_by` is stable, so equal timestamps keep the order
/// they were supplied in (insertion order for store listings).
pub fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Build one tree per entry point, with every descendant drawn from `all`.
///
/// Entry points are returned newest first, and so is every `children` list.
/// Comments whose parent id resolves to nothing in `all` or `entry_points`
/// are dropped.
pub fn build_hierarchy(all: &[Comment], entry_points: &[Comment]) -> Vec<CommentNode> {
    let index = ChildIndex::new(all, entry_points);

    let mut roots = entry_points.to_vec();
    sort_newest_first(&mut roots);

    let mut path = HashSet::new();
    roots
        .into_iter()
        .map(|c| index.attach(c, &mut path))
        .collect()
}

struct ChildIndex<'a> {
    children: HashMap<CommentId, Vec<&'a Comment>>,
}

impl<'a> ChildIndex<'a> {
    fn new(all: &'a [Comment], entry_points: &'a [Comment]) -> Self {
        let known: HashSet<CommentId> = all
            .iter()
            .chain(entry_points.iter())
            .map(|c| c.id)
            .collect();

        let mut children: HashMap<CommentId, Vec<&'a Comment>> = HashMap::new();
        for c in all {
            let Some(parent_id) = c.parent_id else {
                continue;
            };
            if !known.contains(&parent_id) {
                log::debug!("hierarchy.orphan id={} parent={}", c.id, parent_id);
                continue;
            }
            children.entry(parent_id).or_default().push(c);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        Self { children }
    }

    // `path` holds the ids on the way down from the entry point; a record that
    // points back at one of them is skipped rather than recursed into.
    fn attach(&self, comment: Comment, path: &mut HashSet<CommentId>) -> CommentNode {
        path.insert(comment.id);
        let mut children = Vec::new();
        if let Some(list) = self.children.get(&comment.id) {
            for child in list {
                if path.contains(&child.id) {
                    continue;
                }
                children.push(self.attach((*child).clone(), path));
            }
        }
        path.remove(&comment.id);
        CommentNode { comment, children }
    }
}
