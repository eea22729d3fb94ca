use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::model::{Comment, CommentId, NewComment};

/// Storage seam for the comment collection.
///
/// Implementations serialize their own read-modify-write sequences: `insert`
/// must hand out unique, increasing ids and `increment_likes` must never lose
/// an update.
pub trait CommentStore: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn kind(&self) -> &'static str;

    fn insert(&self, new: NewComment) -> Result<Comment>;

    fn find(&self, id: CommentId) -> Result<Option<Comment>>;

    /// Every comment, in insertion order.
    fn list(&self) -> Result<Vec<Comment>>;

    /// Returns the new like count, or `None` when `id` is unknown.
    fn increment_likes(&self, id: CommentId) -> Result<Option<u64>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    comments: Vec<Comment>,
    last_id: CommentId,
}

impl MemoryInner {
    // ids are assigned in increasing order, so the vec stays sorted by id
    fn position(&self, id: CommentId) -> Option<usize> {
        self.comments.binary_search_by_key(&id, |c| c.id).ok()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommentStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn insert(&self, new: NewComment) -> Result<Comment> {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let comment = Comment {
            id: inner.last_id,
            text: new.text,
            author: new.author,
            parent_id: new.parent_id,
            likes: 0,
            timestamp: new.timestamp,
        };
        inner.comments.push(comment.clone());
        Ok(comment)
    }

    fn find(&self, id: CommentId) -> Result<Option<Comment>> {
        let inner = self.inner.lock();
        Ok(inner.position(id).map(|i| inner.comments[i].clone()))
    }

    fn list(&self) -> Result<Vec<Comment>> {
        Ok(self.inner.lock().comments.clone())
    }

    fn increment_likes(&self, id: CommentId) -> Result<Option<u64>> {
        let mut inner = self.inner.lock();
        let Some(i) = inner.position(id) else {
            return Ok(None);
        };
        let comment = &mut inner.comments[i];
        comment.likes += 1;
        Ok(Some(comment.likes))
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    path: String,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            anyhow::bail!("SQLITE_PATH is empty");
        }
        if path != ":memory:" && !path.starts_with("file:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create sqlite parent dir for {path}"))?;
            }
        }

        // rusqlite::Connection is not Sync. Keep only the path and open a
        // short-lived connection per operation; WAL keeps that cheap.
        Ok(Self { path: path.to_string() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn =
            Connection::open(&self.path).with_context(|| format!("open sqlite {}", self.path))?;
        // concurrent writers wait on the file lock instead of failing with SQLITE_BUSY
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(conn)
    }

    pub fn init_db(&self) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS comments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  text TEXT NOT NULL,
  author TEXT NOT NULL,
  parent_id INTEGER,
  likes INTEGER NOT NULL DEFAULT 0,
  ts_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id, ts_ms);
"#,
        )?;
        Ok(())
    }
}

const COMMENT_COLUMNS: &str = "id, text, author, parent_id, likes, ts_ms";

fn comment_from_row(r: &Row<'_>) -> rusqlite::Result<Comment> {
    let ts_ms: i64 = r.get(5)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, ts_ms))?;
    Ok(Comment {
        id: r.get::<_, i64>(0)? as CommentId,
        text: r.get(1)?,
        author: r.get(2)?,
        parent_id: r.get::<_, Option<i64>>(3)?.map(|p| p as CommentId),
        likes: r.get::<_, i64>(4)? as u64,
        timestamp,
    })
}

impl CommentStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&self, new: NewComment) -> Result<Comment> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO comments(text, author, parent_id, likes, ts_ms) VALUES(?,?,?,0,?)",
            params![
                new.text,
                new.author,
                new.parent_id.map(|p| p as i64),
                new.timestamp.timestamp_millis()
            ],
        )
        .context("insert comment")?;
        let id = conn.last_insert_rowid() as CommentId;
        Ok(Comment {
            id,
            text: new.text,
            author: new.author,
            parent_id: new.parent_id,
            likes: 0,
            timestamp: new.timestamp,
        })
    }

    fn find(&self, id: CommentId) -> Result<Option<Comment>> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id=?"),
                params![id as i64],
                comment_from_row,
            )
            .optional()
            .with_context(|| format!("find comment {id}"))?;
        Ok(row)
    }

    fn list(&self) -> Result<Vec<Comment>> {
        let conn = self.open_conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COMMENT_COLUMNS} FROM comments ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], comment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("list comments")?;
        Ok(rows)
    }

    fn increment_likes(&self, id: CommentId) -> Result<Option<u64>> {
        let mut conn = self.open_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE comments SET likes = likes + 1 WHERE id=?",
            params![id as i64],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let likes: i64 = tx.query_row(
            "SELECT likes FROM comments WHERE id=?",
            params![id as i64],
            |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(Some(likes as u64))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn new_comment(text: &str, parent_id: Option<CommentId>, secs: i64) -> NewComment {
        NewComment {
            text: text.to_string(),
            author: "ana".to_string(),
            parent_id,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::milliseconds(secs * 1000 + 250),
        }
    }

    fn exercise(store: &dyn CommentStore) {
        assert!(store.list().unwrap().is_empty());

        let a = store.insert(new_comment("a", None, 0)).unwrap();
        let b = store.insert(new_comment("b", Some(a.id), 1)).unwrap();
        let c = store.insert(new_comment("c", None, 2)).unwrap();
        assert!(a.id < b.id && b.id < c.id);
        assert_eq!(a.likes, 0);

        let found = store.find(b.id).unwrap().unwrap();
        assert_eq!(found, b);
        assert_eq!(found.parent_id, Some(a.id));
        assert!(store.find(c.id + 100).unwrap().is_none());

        assert_eq!(store.increment_likes(a.id).unwrap(), Some(1));
        assert_eq!(store.increment_likes(a.id).unwrap(), Some(2));
        assert_eq!(store.increment_likes(c.id + 100).unwrap(), None);

        let all = store.list().unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(all[0].likes, 2);
        assert_eq!(all[2].timestamp, c.timestamp);
    }

    #[test]
    fn memory_store_behaves() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.kind(), "memory");
    }

    #[test]
    fn memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        let a = store.insert(new_comment("a", None, 0)).unwrap();
        assert_eq!(other.find(a.id).unwrap().map(|c| c.text), Some("a".to_string()));
    }

    #[test]
    fn memory_store_ids_unique_under_concurrency() {
        concurrent_inserts(MemoryStore::new());
    }

    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    fn concurrent_likes<S: CommentStore + Clone + 'static>(store: S) {
        let a = store.insert(new_comment("popular", None, 0)).unwrap();
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        assert!(store.increment_likes(a.id).unwrap().is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let likes = store.find(a.id).unwrap().unwrap().likes;
        assert_eq!(likes as usize, THREADS * PER_THREAD);
    }

    fn concurrent_inserts<S: CommentStore + Clone + 'static>(store: S) {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..PER_THREAD as i64)
                        .map(|i| {
                            let new = new_comment(&format!("{t}-{i}"), None, i);
                            store.insert(new).unwrap().id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<CommentId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), THREADS * PER_THREAD);

        let all = store.list().unwrap();
        assert_eq!(all.len(), THREADS * PER_THREAD);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    fn temp_sqlite(dir: &tempfile::TempDir) -> SqliteStore {
        let path = dir.path().join("comments.sqlite");
        let store = SqliteStore::new(path.to_str().unwrap()).unwrap();
        store.init_db().unwrap();
        store
    }

    #[test]
    fn memory_store_likes_are_not_lost() {
        concurrent_likes(MemoryStore::new());
    }

    #[test]
    fn sqlite_store_likes_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        concurrent_likes(temp_sqlite(&dir));
    }

    #[test]
    fn sqlite_store_ids_unique_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        concurrent_inserts(temp_sqlite(&dir));
    }

    #[test]
    fn sqlite_store_behaves_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("comments.sqlite");
        let path = path.to_str().unwrap();

        let store = SqliteStore::new(path).unwrap();
        store.init_db().unwrap();
        exercise(&store);

        let reopened = SqliteStore::new(path).unwrap();
        reopened.init_db().unwrap();
        assert_eq!(reopened.list().unwrap().len(), 3);
        assert_eq!(reopened.kind(), "sqlite");
        assert_eq!(reopened.path(), path);
    }

    #[test]
    fn sqlite_store_rejects_empty_path() {
        assert!(SqliteStore::new("  ").is_err());
    }
}
