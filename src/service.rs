use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    hierarchy::{build_hierarchy, sort_newest_first},
    model::{
        Comment, CommentId, CommentNode, CommentPage, NewComment, ReplyPage, ReplyPagination,
        RootPagination, MAX_AUTHOR_CHARS, MAX_TEXT_CHARS,
    },
    store::CommentStore,
    utils::now_millis,
};

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const DEFAULT_REPLY_LIMIT: usize = 5;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Body of a create request. Fields are optional so that a missing field
/// reports the same reason as an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComment {
    pub text: Option<String>,
    pub author: Option<String>,
    pub parent_id: Option<CommentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyRequest {
    /// Echoed back to the caller; `skip` decides the slice.
    pub page: usize,
    pub skip: usize,
    pub limit: usize,
}

impl Default for ReplyRequest {
    fn default() -> Self {
        Self {
            page: 1,
            skip: 0,
            limit: DEFAULT_REPLY_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn CommentStore>,
    clock: Clock,
    max_limit: usize,
}

impl CommentService {
    pub fn new(store: Arc<dyn CommentStore>, max_limit: usize) -> Self {
        Self {
            store,
            clock: Arc::new(now_millis),
            max_limit: max_limit.max(1),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.max_limit)
    }

    pub fn create_comment(&self, input: CreateComment) -> Result<Comment> {
        let text = input.text.unwrap_or_default();
        let author = input.author.unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::validation("Comment text is required"));
        }
        if author.trim().is_empty() {
            return Err(Error::validation("Author is required"));
        }
        // length limits apply to the raw input, before trimming
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(Error::validation(format!(
                "Comment text is too long (max {MAX_TEXT_CHARS} characters)"
            )));
        }
        if author.chars().count() > MAX_AUTHOR_CHARS {
            return Err(Error::validation(format!(
                "Author name is too long (max {MAX_AUTHOR_CHARS} characters)"
            )));
        }
        // any given parent id must exist; 0 is never assigned, so it is not found
        if let Some(parent_id) = input.parent_id {
            if self.store.find(parent_id)?.is_none() {
                return Err(Error::not_found("Parent comment not found"));
            }
        }

        let comment = self
            .store
            .insert(NewComment {
                text: text.trim().to_string(),
                author: author.trim().to_string(),
                parent_id: input.parent_id,
                timestamp: (self.clock)(),
            })
            .context("store comment")?;

        log::info!(
            "comments.create id={} parent={:?} author={}",
            comment.id,
            comment.parent_id,
            comment.author
        );
        Ok(comment)
    }

    pub fn like_comment(&self, id: CommentId) -> Result<u64> {
        let likes = self
            .store
            .increment_likes(id)?
            .ok_or_else(|| Error::not_found("Comment not found"))?;
        log::debug!("comments.like id={id} likes={likes}");
        Ok(likes)
    }

    pub fn list_root_comments(&self, req: PageRequest) -> Result<CommentPage> {
        let page = req.page.max(1);
        let limit = self.clamp_limit(req.limit);

        let all = self.store.list()?;
        let mut roots: Vec<Comment> = all.iter().filter(|c| c.is_root()).cloned().collect();
        sort_newest_first(&mut roots);

        let total = roots.len();
        let pages = total.div_ceil(limit);
        let skip = (page - 1).saturating_mul(limit);
        let slice: Vec<Comment> = roots.into_iter().skip(skip).take(limit).collect();

        let comments = build_hierarchy(&all, &slice);
        log::debug!(
            "comments.list_roots page={page} limit={limit} total={total} returned={} nodes={}",
            comments.len(),
            comments.iter().map(CommentNode::subtree_len).sum::<usize>()
        );
        Ok(CommentPage {
            comments,
            pagination: RootPagination {
                page,
                limit,
                total,
                pages,
                has_next_page: page < pages,
                has_prev_page: page > 1,
            },
        })
    }

    pub fn list_replies(&self, id: CommentId, req: ReplyRequest) -> Result<ReplyPage> {
        let limit = self.clamp_limit(req.limit);
        let skip = req.skip;

        if self.store.find(id)?.is_none() {
            return Err(Error::not_found("Comment not found"));
        }

        let all = self.store.list()?;
        let mut direct: Vec<Comment> = all
            .iter()
            .filter(|c| c.parent_id == Some(id))
            .cloned()
            .collect();
        sort_newest_first(&mut direct);

        let total = direct.len();
        let slice: Vec<Comment> = direct.into_iter().skip(skip).take(limit).collect();

        let replies = build_hierarchy(&all, &slice);
        log::debug!(
            "comments.list_replies id={id} skip={skip} limit={limit} total={total} returned={} nodes={}",
            replies.len(),
            replies.iter().map(CommentNode::subtree_len).sum::<usize>()
        );
        Ok(ReplyPage {
            replies,
            pagination: ReplyPagination {
                page: req.page,
                limit,
                skip,
                total,
                has_more: skip.saturating_add(limit) < total,
            },
        })
    }
}
