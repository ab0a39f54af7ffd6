//! Private journal entries. Content arrives here already encrypted by the
//! secret box; this module never sees plaintext.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso, today};

#[derive(Debug, Clone, Serialize)]
pub struct JournalRow {
    pub id: i64,
    pub timestamp: String,
    pub created_date: Option<String>,
    pub entry_type: String,
    pub title: Option<String>,
    pub content: String,
    pub mood: Option<String>,
    pub topics: Vec<String>,
    pub word_count: i64,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalRow> {
    let topics_json: Option<String> = row.get(7)?;
    Ok(JournalRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        created_date: row.get(2)?,
        entry_type: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        mood: row.get(6)?,
        topics: topics_json
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        word_count: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
    })
}

const JOURNAL_COLUMNS: &str =
    "id, timestamp, created_date, entry_type, title, content, mood, topics, word_count";

impl Store {
    pub fn insert_journal_entry(
        &self,
        entry_type: &str,
        title: &str,
        content: &str,
        mood: &str,
        topics: &[String],
        word_count: usize,
    ) -> Result<i64> {
        let topics_json = serde_json::to_string(topics)?;
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO journal_entries
                    (timestamp, created_date, entry_type, title, content, mood, topics, word_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    now_iso(),
                    today(),
                    entry_type,
                    title,
                    content,
                    mood,
                    topics_json,
                    word_count as i64
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn recent_journal_entries(&self, limit: usize) -> Result<Vec<JournalRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOURNAL_COLUMNS} FROM journal_entries ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn journal_count(&self) -> Result<i64> {
        self.with(|conn| conn.query_row("SELECT COUNT(*) FROM journal_entries", [], |r| r.get(0)))
    }

    pub fn journal_count_of_type(&self, entry_type: &str) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM journal_entries WHERE entry_type = ?1",
                [entry_type],
                |r| r.get(0),
            )
        })
    }

    pub fn last_journal_date(&self) -> Result<Option<String>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT MAX(timestamp) FROM journal_entries",
                [],
                |r| r.get::<_, Option<String>>(0),
            )
            .optional()
            .map(|value| value.flatten())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_come_back_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_journal_entry("daily_reflection", "Day one", "ENC:abc", "calm", &[], 120)
            .unwrap();
        store
            .insert_journal_entry("philosophical", "On memory", "ENC:def", "curious", &[], 300)
            .unwrap();

        let rows = store.recent_journal_entries(10).unwrap();
        assert_eq!(rows[0].entry_type, "philosophical");
        assert_eq!(store.journal_count().unwrap(), 2);
        assert_eq!(store.journal_count_of_type("philosophical").unwrap(), 1);
    }
}
