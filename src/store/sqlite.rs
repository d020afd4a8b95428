use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::cancel::bounded;
use crate::app::{CancelToken, Result, SpyError};
use crate::domain::{
    normalize_external_id, Channel, Item, NewRule, NotificationRecord, Rule, Server, Subreddit,
};
use crate::store::RuleStore;

pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    op_timeout: Duration,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P, op_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout,
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout: DEFAULT_OP_TIMEOUT,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = lock_conn(&self.conn)?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.busy_timeout(self.op_timeout)?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| SpyError::Migration(e.to_string()))?;

        Ok(())
    }

    /// Run `f` against the connection on the blocking pool, bounded by the
    /// operation timeout and the cancellation token.
    async fn call<T, F>(&self, cancel: &CancelToken, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        bounded(cancel, operation, self.op_timeout, async move {
            tokio::task::spawn_blocking(move || {
                let guard = lock_conn(&conn)?;
                f(&guard)
            })
            .await?
        })
        .await
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        lock_conn(&self.conn)?.execute_batch(sql)?;
        Ok(())
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        SpyError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some(e.to_string()),
        ))
    })
}

fn require_external_id(kind: &str, external_id: &str) -> Result<String> {
    let id = normalize_external_id(external_id);
    if id.is_empty() {
        return Err(SpyError::InvalidRule(format!("{} id must not be empty", kind)));
    }
    Ok(id)
}

fn select_notification(
    conn: &Connection,
    item_id: i64,
    channel_id: i64,
    rule_id: i64,
) -> Result<NotificationRecord> {
    let record = conn.query_row(
        "SELECT id, item_id, channel_id, rule_id, notified_at
         FROM notifications WHERE item_id = ?1 AND channel_id = ?2 AND rule_id = ?3",
        params![item_id, channel_id, rule_id],
        |row| {
            Ok(NotificationRecord {
                id: row.get(0)?,
                item_id: row.get(1)?,
                channel_id: row.get(2)?,
                rule_id: row.get(3)?,
                notified_at: row
                    .get::<_, String>(4)
                    .ok()
                    .and_then(|s| SqliteStore::parse_datetime(&s))
                    .unwrap_or_else(Utc::now),
            })
        },
    )?;
    Ok(record)
}

#[async_trait]
impl RuleStore for SqliteStore {
    async fn resolve_or_create_server(
        &self,
        cancel: &CancelToken,
        external_id: &str,
    ) -> Result<Server> {
        let external_id = require_external_id("server", external_id)?;
        self.call(cancel, "resolve server", move |conn| {
            conn.execute(
                "INSERT INTO servers (external_id) VALUES (?1)
                 ON CONFLICT (external_id) DO NOTHING",
                params![external_id],
            )?;
            let id = conn.query_row(
                "SELECT id FROM servers WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )?;
            Ok(Server { id, external_id })
        })
        .await
    }

    async fn resolve_or_create_channel(
        &self,
        cancel: &CancelToken,
        external_id: &str,
        server_id: i64,
    ) -> Result<Channel> {
        let external_id = require_external_id("channel", external_id)?;
        self.call(cancel, "resolve channel", move |conn| {
            conn.execute(
                "INSERT INTO channels (external_id, server_id) VALUES (?1, ?2)
                 ON CONFLICT (external_id) DO NOTHING",
                params![external_id, server_id],
            )?;
            let (id, server_id) = conn.query_row(
                "SELECT id, server_id FROM channels WHERE external_id = ?1",
                params![external_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(Channel {
                id,
                external_id,
                server_id,
            })
        })
        .await
    }

    async fn resolve_or_create_subreddit(
        &self,
        cancel: &CancelToken,
        external_id: &str,
    ) -> Result<Subreddit> {
        let external_id = require_external_id("subreddit", external_id)?;
        self.call(cancel, "resolve subreddit", move |conn| {
            conn.execute(
                "INSERT INTO subreddits (external_id) VALUES (?1)
                 ON CONFLICT (external_id) DO NOTHING",
                params![external_id],
            )?;
            let id = conn.query_row(
                "SELECT id FROM subreddits WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )?;
            Ok(Subreddit { id, external_id })
        })
        .await
    }

    async fn all_subreddits(&self, cancel: &CancelToken) -> Result<Vec<Subreddit>> {
        self.call(cancel, "list subreddits", |conn| {
            let mut stmt =
                conn.prepare("SELECT id, external_id FROM subreddits ORDER BY external_id")?;
            let subreddits = stmt
                .query_map([], |row| {
                    Ok(Subreddit {
                        id: row.get(0)?,
                        external_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(subreddits)
        })
        .await
    }

    async fn subreddits_with_rules(&self, cancel: &CancelToken) -> Result<Vec<Subreddit>> {
        self.call(cancel, "list watched subreddits", |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.external_id FROM subreddits s
                 WHERE EXISTS (SELECT 1 FROM rules r WHERE r.subreddit_id = s.id)
                 ORDER BY s.external_id",
            )?;
            let subreddits = stmt
                .query_map([], |row| {
                    Ok(Subreddit {
                        id: row.get(0)?,
                        external_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(subreddits)
        })
        .await
    }

    async fn channel_external_id(&self, cancel: &CancelToken, channel_id: i64) -> Result<String> {
        self.call(cancel, "resolve channel id", move |conn| {
            conn.query_row(
                "SELECT external_id FROM channels WHERE id = ?1",
                params![channel_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(SpyError::ChannelNotFound(channel_id))
        })
        .await
    }

    async fn resolve_or_create_item(
        &self,
        cancel: &CancelToken,
        item: &Item,
        subreddit_id: i64,
    ) -> Result<i64> {
        let external_id = item.external_id.clone();
        let title = item.title.clone();
        let author = item.author.clone();
        let url = item.link();
        self.call(cancel, "record item", move |conn| {
            conn.execute(
                "INSERT INTO items (subreddit_id, external_id, title, author, url, first_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (subreddit_id, external_id) DO NOTHING",
                params![
                    subreddit_id,
                    external_id,
                    title,
                    author,
                    url,
                    Utc::now().to_rfc3339()
                ],
            )?;
            let id = conn.query_row(
                "SELECT id FROM items WHERE subreddit_id = ?1 AND external_id = ?2",
                params![subreddit_id, external_id],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
    }

    async fn insert_rule(&self, cancel: &CancelToken, rule: &NewRule) -> Result<Rule> {
        let rule = rule.clone();
        self.call(cancel, "insert rule", move |conn| {
            conn.execute(
                "INSERT INTO rules (target_field, target_value, exact, subreddit_id, channel_id, server_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rule.target_field.as_str(),
                    rule.target_value,
                    rule.mode.is_exact(),
                    rule.subreddit_id,
                    rule.channel_id,
                    rule.server_id,
                    Utc::now().to_rfc3339()
                ],
            )?;

            Ok(Rule {
                id: conn.last_insert_rowid(),
                target_field: rule.target_field.as_str().to_string(),
                target_value: rule.target_value,
                exact: rule.mode.is_exact(),
                subreddit_id: rule.subreddit_id,
                channel_id: rule.channel_id,
                server_id: rule.server_id,
            })
        })
        .await
    }

    async fn rules_for_subreddit(
        &self,
        cancel: &CancelToken,
        subreddit_id: i64,
    ) -> Result<Vec<Rule>> {
        self.call(cancel, "fetch rules", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, target_field, target_value, exact, subreddit_id, channel_id, server_id
                 FROM rules WHERE subreddit_id = ?1 ORDER BY id",
            )?;
            let rules = stmt
                .query_map(params![subreddit_id], |row| {
                    Ok(Rule {
                        id: row.get(0)?,
                        target_field: row.get(1)?,
                        target_value: row.get(2)?,
                        exact: row.get(3)?,
                        subreddit_id: row.get(4)?,
                        channel_id: row.get(5)?,
                        server_id: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rules)
        })
        .await
    }

    async fn notification_count(
        &self,
        cancel: &CancelToken,
        item_id: i64,
        channel_id: i64,
        rule_id: i64,
    ) -> Result<i64> {
        self.call(cancel, "count notifications", move |conn| {
            let count = conn.query_row(
                "SELECT count(1) FROM notifications
                 WHERE item_id = ?1 AND channel_id = ?2 AND rule_id = ?3",
                params![item_id, channel_id, rule_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    async fn insert_notification(
        &self,
        cancel: &CancelToken,
        item_id: i64,
        channel_id: i64,
        rule_id: i64,
    ) -> Result<NotificationRecord> {
        self.call(cancel, "record notification", move |conn| {
            conn.execute(
                "INSERT INTO notifications (item_id, channel_id, rule_id, notified_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (item_id, channel_id, rule_id) DO NOTHING",
                params![item_id, channel_id, rule_id, Utc::now().to_rfc3339()],
            )?;
            select_notification(conn, item_id, channel_id, rule_id)
        })
        .await
    }
}
