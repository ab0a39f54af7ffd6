//! Side-channel logs: creative outputs, web searches, email, and the
//! social-network action log with its feed cache.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso, today};

/// Char-safe truncation for columns with a size cap.
fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CreativeOutputRow {
    pub id: i64,
    pub created_at: String,
    pub output_type: String,
    pub title: String,
    pub content: Option<String>,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub run_result: Option<String>,
    pub run_success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchLogRow {
    pub timestamp: String,
    pub query: String,
    pub result_count: i64,
    pub source: String,
    pub top_result: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailLogRow {
    pub sent_at: String,
    pub recipient: String,
    pub subject: String,
    pub email_type: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoltbookLogRow {
    pub timestamp: String,
    pub action: String,
    pub content: String,
    pub result: String,
    pub post_id: Option<String>,
    pub post_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPost {
    pub post_id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub upvotes: i64,
    pub submolt: String,
}

impl Store {
    // ── Creative outputs ───────────────────────────────────────────────

    pub fn insert_creative_output(
        &self,
        output_type: &str,
        title: &str,
        content: &str,
        language: &str,
        prompt: &str,
    ) -> Result<i64> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO creative_outputs
                    (created_at, output_type, title, content, language, prompt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![now_iso(), output_type, title, content, language, clip(prompt, 500)],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn set_creative_run_result(&self, id: i64, success: bool, result: &str) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "UPDATE creative_outputs SET run_result = ?1, run_success = ?2 WHERE id = ?3",
                params![clip(result, 2000), success as i64, id],
            )?;
            Ok(())
        })
    }

    pub fn creative_history(
        &self,
        limit: usize,
        output_type: Option<&str>,
    ) -> Result<Vec<CreativeOutputRow>> {
        self.with(|conn| {
            let (sql, filter) = match output_type {
                Some(kind) => (
                    "SELECT id, created_at, output_type, title, language, run_success
                     FROM creative_outputs WHERE output_type = ?1 ORDER BY id DESC LIMIT ?2",
                    Some(kind),
                ),
                None => (
                    "SELECT id, created_at, output_type, title, language, run_success
                     FROM creative_outputs ORDER BY id DESC LIMIT ?1",
                    None,
                ),
            };
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<CreativeOutputRow> {
                Ok(CreativeOutputRow {
                    id: row.get(0)?,
                    created_at: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    output_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    content: None,
                    language: row.get(4)?,
                    prompt: None,
                    run_result: None,
                    run_success: row.get::<_, Option<i64>>(5)?.unwrap_or(0) != 0,
                })
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = match filter {
                Some(kind) => stmt
                    .query_map(params![kind, limit], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map([limit], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows)
        })
    }

    pub fn creative_output(&self, id: i64) -> Result<Option<CreativeOutputRow>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT id, created_at, output_type, title, content, language, prompt,
                        run_result, run_success
                 FROM creative_outputs WHERE id = ?1",
                [id],
                |row| {
                    Ok(CreativeOutputRow {
                        id: row.get(0)?,
                        created_at: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        output_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        content: row.get(4)?,
                        language: row.get(5)?,
                        prompt: row.get(6)?,
                        run_result: row.get(7)?,
                        run_success: row.get::<_, Option<i64>>(8)?.unwrap_or(0) != 0,
                    })
                },
            )
            .optional()
        })
    }

    /// Counts per output type, for the capabilities snapshot.
    pub fn creative_counts(&self) -> Result<Vec<(String, i64)>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT output_type, COUNT(*) FROM creative_outputs GROUP BY output_type",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ── Search log ─────────────────────────────────────────────────────

    pub fn log_search(
        &self,
        query: &str,
        result_count: usize,
        source: &str,
        top_result: &str,
    ) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO search_log (timestamp, query, result_count, source, top_result)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![now_iso(), query, result_count as i64, source, clip(top_result, 200)],
            )?;
            Ok(())
        })
    }

    pub fn search_history(&self, limit: usize) -> Result<Vec<SearchLogRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, query, result_count, source, top_result FROM search_log
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(SearchLogRow {
                        timestamp: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        query: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        result_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        top_result: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ── Email log ──────────────────────────────────────────────────────

    pub fn log_email(
        &self,
        recipient: &str,
        subject: &str,
        email_type: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO email_log (sent_at, recipient, subject, email_type, success, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![now_iso(), recipient, subject, email_type, success as i64, error],
            )?;
            Ok(())
        })
    }

    pub fn email_log(&self, limit: usize) -> Result<Vec<EmailLogRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sent_at, recipient, subject, email_type, success, error FROM email_log
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(EmailLogRow {
                        sent_at: row.get(0)?,
                        recipient: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        subject: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        email_type: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        success: row.get::<_, Option<i64>>(4)?.unwrap_or(0) != 0,
                        error: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Whether a successful email of this type already went out today.
    pub fn email_sent_today(&self, email_type: &str) -> Result<bool> {
        let start = format!("{}T00:00:00", today());
        let count: i64 = self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM email_log
                 WHERE email_type = ?1 AND success = 1 AND sent_at >= ?2",
                params![email_type, start],
                |r| r.get(0),
            )
        })?;
        Ok(count > 0)
    }

    // ── Moltbook log + feed cache ──────────────────────────────────────

    pub fn log_moltbook(
        &self,
        action: &str,
        content: &str,
        result: &str,
        post_id: &str,
        post_url: &str,
    ) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO moltbook_log (timestamp, action, content, result, post_id, post_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    now_iso(),
                    action,
                    clip(content, 500),
                    clip(result, 500),
                    post_id,
                    post_url
                ],
            )?;
            Ok(())
        })
    }

    pub fn moltbook_log(&self, limit: usize) -> Result<Vec<MoltbookLogRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, action, content, result, post_id, post_url FROM moltbook_log
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(MoltbookLogRow {
                        timestamp: row.get(0)?,
                        action: row.get(1)?,
                        content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        result: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        post_id: row.get(4)?,
                        post_url: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn moltbook_post_count(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM moltbook_log WHERE action IN ('post', 'diary_post')",
                [],
                |r| r.get(0),
            )
        })
    }

    pub fn recent_moltbook_posts(&self, limit: usize) -> Result<Vec<MoltbookLogRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, action, content, result, post_id, post_url FROM moltbook_log
                 WHERE action IN ('post', 'diary_post', 'comment')
                 ORDER BY timestamp DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(MoltbookLogRow {
                        timestamp: row.get(0)?,
                        action: row.get(1)?,
                        content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        result: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        post_id: row.get(4)?,
                        post_url: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn cache_feed_posts(&self, posts: &[FeedPost]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let now = now_iso();
        self.tx(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO moltbook_feed_cache
                    (fetched_at, post_id, title, content, author, upvotes, submolt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(post_id) DO UPDATE SET
                     fetched_at = excluded.fetched_at,
                     upvotes = excluded.upvotes",
            )?;
            for post in posts {
                stmt.execute(params![
                    now,
                    post.post_id,
                    post.title,
                    post.content,
                    post.author,
                    post.upvotes,
                    post.submolt
                ])?;
            }
            Ok(())
        })
    }

    pub fn cached_feed(&self, limit: usize) -> Result<Vec<FeedPost>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT post_id, title, content, author, upvotes, submolt
                 FROM moltbook_feed_cache ORDER BY fetched_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(FeedPost {
                        post_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        author: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        upvotes: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                        submolt: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
