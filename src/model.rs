use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

pub type CommentId = u64;

pub const MAX_TEXT_CHARS: usize = 1000;
pub const MAX_AUTHOR_CHARS: usize = 50;

/// A stored comment record. Immutable apart from `likes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author: String,
    pub parent_id: Option<CommentId>,
    pub likes: u64,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Legacy string key the UI renders lists with.
    pub fn render_key(&self) -> String {
        format!("comment_{}", self.id)
    }
}

/// Validated input for a store insert. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub text: String,
    pub author: String,
    pub parent_id: Option<CommentId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentWire<'a> {
    #[serde(rename = "_id")]
    render_key: String,
    id: CommentId,
    text: &'a str,
    author: &'a str,
    parent_id: Option<CommentId>,
    likes: u64,
    #[serde(serialize_with = "serialize_millis")]
    timestamp: &'a DateTime<Utc>,
}

// Always three fractional digits, even on whole seconds.
fn serialize_millis<S: Serializer>(
    ts: &&DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl<'a> From<&'a Comment> for CommentWire<'a> {
    fn from(c: &'a Comment) -> Self {
        Self {
            render_key: c.render_key(),
            id: c.id,
            text: &c.text,
            author: &c.author,
            parent_id: c.parent_id,
            likes: c.likes,
            timestamp: &c.timestamp,
        }
    }
}

impl Serialize for Comment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CommentWire::from(self).serialize(serializer)
    }
}

/// A comment with its reply subtree attached, built per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of nodes in this subtree, including the node itself.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(CommentNode::subtree_len).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootPagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentNode>,
    pub pagination: RootPagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPagination {
    pub page: usize,
    pub limit: usize,
    pub skip: usize,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPage {
    pub replies: Vec<CommentNode>,
    pub pagination: ReplyPagination,
}
