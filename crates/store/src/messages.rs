//! The raw chat log. Append-only; rows are never mutated except for the
//! user-feedback column.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso, today};

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub timestamp: String,
    pub platform: String,
    pub role: String,
    pub content: String,
    pub importance: f64,
    pub emotional_weight: f64,
    pub context_tags: Vec<String>,
    pub ai_version: i64,
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    let tags_json: Option<String> = row.get(7)?;
    Ok(MessageRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        platform: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        importance: row.get(5)?,
        emotional_weight: row.get(6)?,
        context_tags: tags_json
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        ai_version: row.get::<_, Option<i64>>(8)?.unwrap_or(1),
    })
}

const MESSAGE_COLUMNS: &str = "id, timestamp, platform, role, content, importance_score, \
                               emotional_weight, context_tags, ai_version";

impl Store {
    /// Append one exchange: the user row then the assistant row, sharing a
    /// timestamp, importance, weight, and tags. Returns (user_id, assistant_id).
    #[allow(clippy::too_many_arguments)]
    pub fn log_exchange(
        &self,
        platform: &str,
        user_content: &str,
        assistant_content: &str,
        importance: f64,
        emotional_weight: f64,
        context_tags: &[String],
        ai_version: i64,
    ) -> Result<(i64, i64)> {
        let timestamp = now_iso();
        let tags = serde_json::to_string(context_tags)?;
        self.tx(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO chat_history
                    (timestamp, platform, role, content, importance_score,
                     emotional_weight, context_tags, ai_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            stmt.execute(params![
                timestamp,
                platform,
                "user",
                user_content,
                importance,
                emotional_weight,
                tags,
                ai_version
            ])?;
            let user_id = tx.last_insert_rowid();
            stmt.execute(params![
                timestamp,
                platform,
                "assistant",
                assistant_content,
                importance,
                emotional_weight,
                tags,
                ai_version
            ])?;
            Ok((user_id, tx.last_insert_rowid()))
        })
    }

    /// System events land in the log at full importance so they always
    /// survive into episodes.
    pub fn log_system_message(&self, content: &str, ai_version: i64) -> Result<i64> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO chat_history
                    (timestamp, platform, role, content, importance_score, emotional_weight, ai_version)
                 VALUES (?1, 'main_ui', 'system', ?2, 1.0, 1.0, ?3)",
                params![now_iso(), content, ai_version],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Most recent messages in chronological order.
    pub fn recent_messages(&self, limit: usize) -> Result<Vec<MessageRow>> {
        let mut rows = self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_history ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.reverse();
        Ok(rows)
    }

    /// Last `limit` user messages, newest first.
    pub fn recent_user_messages(&self, limit: usize) -> Result<Vec<String>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT content FROM chat_history WHERE role = 'user'
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Today's user/assistant rows in chronological order, capped.
    pub fn messages_today(&self, limit: usize) -> Result<Vec<(String, String)>> {
        let start = format!("{}T00:00:00", today());
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM chat_history
                 WHERE timestamp >= ?1 AND role IN ('user', 'assistant')
                 ORDER BY id ASC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![start, limit], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Rows in the inclusive id range, chronological. Episode input.
    pub fn messages_in_range(&self, from_id: i64, to_id: i64) -> Result<Vec<(String, String)>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM chat_history
                 WHERE id BETWEEN ?1 AND ?2 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![from_id, to_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// (count, min_id, max_id) of messages with id greater than `after`.
    pub fn messages_after(&self, after: i64) -> Result<(u32, Option<i64>, Option<i64>)> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*), MIN(id), MAX(id) FROM chat_history WHERE id > ?1",
                [after],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
        })
    }

    pub fn message_count(&self) -> Result<i64> {
        self.with(|conn| conn.query_row("SELECT COUNT(*) FROM chat_history", [], |r| r.get(0)))
    }

    pub fn user_message_count(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM chat_history WHERE role = 'user'",
                [],
                |r| r.get(0),
            )
        })
    }

    pub fn message_by_id(&self, message_id: i64) -> Result<Option<MessageRow>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM chat_history WHERE id = ?1"),
                [message_id],
                row_to_message,
            )
            .optional()
        })
    }

    pub fn last_user_message_timestamp(&self) -> Result<Option<String>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT timestamp FROM chat_history WHERE role = 'user'
                 ORDER BY timestamp DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()
        })
    }

    /// Record user feedback against a message row.
    pub fn set_message_feedback(&self, message_id: i64, feedback: &str) -> Result<bool> {
        let updated = self.tx(|tx| {
            tx.execute(
                "UPDATE chat_history SET user_feedback = ?1 WHERE id = ?2",
                params![feedback, message_id],
            )
        })?;
        Ok(updated > 0)
    }

    /// All user rows with ids, oldest first. Thread-rebuild input.
    pub fn all_user_messages(&self) -> Result<Vec<(i64, String, String)>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, timestamp FROM chat_history
                 WHERE role = 'user' ORDER BY timestamp ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
