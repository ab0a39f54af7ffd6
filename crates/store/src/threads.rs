//! Conversation threads: keyword clusters over the raw chat log.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store};

#[derive(Debug, Clone, Serialize)]
pub struct ThreadRow {
    pub id: i64,
    pub name: String,
    pub keywords: Vec<String>,
    pub message_count: i64,
    pub started_at: Option<String>,
    pub last_activity: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRow> {
    let keywords_json: Option<String> = row.get(2)?;
    Ok(ThreadRow {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        keywords: keywords_json
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        message_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        started_at: row.get(4)?,
        last_activity: row.get(5)?,
    })
}

const THREAD_COLUMNS: &str = "id, thread_name, keywords, message_count, started_at, last_activity";

impl Store {
    pub fn create_thread(
        &self,
        name: &str,
        keywords: &[String],
        timestamp: &str,
        message_id: i64,
    ) -> Result<i64> {
        let keywords_json = serde_json::to_string(keywords)?;
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO conversation_threads
                    (thread_name, keywords, message_count, started_at, last_activity)
                 VALUES (?1, ?2, 1, ?3, ?3)",
                params![name, keywords_json, timestamp],
            )?;
            let thread_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO thread_messages (thread_id, message_id, added_at)
                 VALUES (?1, ?2, ?3)",
                params![thread_id, message_id, timestamp],
            )?;
            Ok(thread_id)
        })
    }

    pub fn append_to_thread(
        &self,
        thread_id: i64,
        merged_keywords: &[String],
        timestamp: &str,
        message_id: i64,
    ) -> Result<()> {
        let keywords_json = serde_json::to_string(merged_keywords)?;
        self.tx(|tx| {
            tx.execute(
                "UPDATE conversation_threads
                 SET keywords = ?1, message_count = message_count + 1, last_activity = ?2
                 WHERE id = ?3",
                params![keywords_json, timestamp, thread_id],
            )?;
            tx.execute(
                "INSERT INTO thread_messages (thread_id, message_id, added_at)
                 VALUES (?1, ?2, ?3)",
                params![thread_id, message_id, timestamp],
            )?;
            Ok(())
        })
    }

    /// Threads touched since `cutoff`, most recent first, for matching.
    pub fn active_threads_since(&self, cutoff: &str, limit: usize) -> Result<Vec<ThreadRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {THREAD_COLUMNS} FROM conversation_threads
                 WHERE last_activity >= ?1 ORDER BY last_activity DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![cutoff, limit], row_to_thread)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn threads(&self, limit: usize) -> Result<Vec<ThreadRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {THREAD_COLUMNS} FROM conversation_threads
                 ORDER BY last_activity DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], row_to_thread)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn thread_by_id(&self, thread_id: i64) -> Result<Option<ThreadRow>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM conversation_threads WHERE id = ?1"),
                [thread_id],
                row_to_thread,
            )
            .optional()
        })
    }

    pub fn thread_messages(&self, thread_id: i64) -> Result<Vec<ThreadMessage>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ch.role, ch.content, ch.timestamp
                 FROM chat_history ch
                 JOIN thread_messages tm ON ch.id = tm.message_id
                 WHERE tm.thread_id = ?1
                 ORDER BY ch.timestamp ASC",
            )?;
            let rows = stmt
                .query_map([thread_id], |row| {
                    Ok(ThreadMessage {
                        role: row.get(0)?,
                        content: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Drop all thread state ahead of a full rebuild.
    pub fn clear_threads(&self) -> Result<()> {
        self.tx(|tx| {
            tx.execute("DELETE FROM thread_messages", [])?;
            tx.execute("DELETE FROM conversation_threads", [])?;
            Ok(())
        })
    }
}
