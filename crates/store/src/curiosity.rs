//! The curiosity research queue. Pending rows are the work backlog; a row
//! moves to completed exactly once and is never re-queued.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct CuriosityItem {
    pub id: i64,
    pub topic: String,
    pub priority: f64,
    pub added_date: String,
    pub reason: String,
    pub status: String,
    pub research_notes: Option<String>,
    pub completed_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct CuriosityCounts {
    pub pending: i64,
    pub completed: i64,
    pub total: i64,
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<CuriosityItem> {
    Ok(CuriosityItem {
        id: row.get(0)?,
        topic: row.get(1)?,
        priority: row.get::<_, Option<f64>>(2)?.unwrap_or(0.5),
        added_date: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        reason: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        status: row.get(5)?,
        research_notes: row.get(6)?,
        completed_date: row.get(7)?,
    })
}

const ITEM_COLUMNS: &str =
    "id, topic, priority, added_date, reason, status, research_notes, completed_date";

impl Store {
    /// Queue a topic for research. Dedup by lowercased topic among pending
    /// rows happens inside the same transaction as the insert, so both the
    /// LLM and regex extraction paths funnel through one guard. Returns
    /// false when an equivalent pending row already exists.
    pub fn enqueue_curiosity(&self, topic: &str, reason: &str, priority: f64) -> Result<bool> {
        self.tx(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM curiosity_queue
                     WHERE LOWER(topic) = LOWER(?1) AND status = 'pending'",
                    [topic],
                    |r| r.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO curiosity_queue (topic, priority, added_date, reason, status)
                 VALUES (?1, ?2, ?3, ?4, 'pending')",
                params![topic, priority, now_iso(), reason],
            )?;
            Ok(true)
        })
    }

    /// Highest-priority pending items, FIFO within equal priority.
    pub fn pending_curiosity(&self, limit: usize) -> Result<Vec<CuriosityItem>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM curiosity_queue
                 WHERE status = 'pending'
                 ORDER BY priority DESC, added_date ASC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Transition a pending item to completed with its research notes.
    /// A completed item stays completed.
    pub fn complete_curiosity(&self, id: i64, notes: &str) -> Result<bool> {
        let updated = self.tx(|tx| {
            tx.execute(
                "UPDATE curiosity_queue
                 SET status = 'completed', completed_date = ?1, research_notes = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![now_iso(), notes, id],
            )
        })?;
        Ok(updated > 0)
    }

    pub fn curiosity_counts(&self) -> Result<CuriosityCounts> {
        self.with(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM curiosity_queue GROUP BY status")?;
            let mut counts = CuriosityCounts::default();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                counts.total += count;
                match status.as_str() {
                    "pending" => counts.pending = count,
                    "completed" => counts.completed = count,
                    _ => {}
                }
            }
            Ok(counts)
        })
    }

    pub fn recent_curiosity(&self, limit: usize) -> Result<Vec<CuriosityItem>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM curiosity_queue ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_dedup_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        assert!(store
            .enqueue_curiosity("Reconstructive Memory", "saw it in chat", 0.6)
            .unwrap());
        assert!(!store
            .enqueue_curiosity("reconstructive memory", "saw it again", 0.6)
            .unwrap());
        assert_eq!(store.curiosity_counts().unwrap().pending, 1);
    }

    #[test]
    fn completed_topic_can_be_requeued_pending_cannot() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue_curiosity("topic a", "r", 0.6).unwrap();
        let item = store.pending_curiosity(1).unwrap().remove(0);
        assert!(store.complete_curiosity(item.id, "notes").unwrap());

        // Dedup only guards pending rows, so the topic can come back later.
        assert!(store.enqueue_curiosity("topic a", "r2", 0.6).unwrap());
    }

    #[test]
    fn completion_is_monotone() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue_curiosity("one-shot topic", "r", 0.6).unwrap();
        let item = store.pending_curiosity(1).unwrap().remove(0);
        assert!(store.complete_curiosity(item.id, "first notes").unwrap());
        // A second completion attempt is a no-op.
        assert!(!store.complete_curiosity(item.id, "other notes").unwrap());

        let all = store.recent_curiosity(10).unwrap();
        assert_eq!(all[0].research_notes.as_deref(), Some("first notes"));
    }

    #[test]
    fn pending_order_is_priority_then_fifo() {
        let store = Store::open_in_memory().unwrap();
        store.enqueue_curiosity("low early", "r", 0.4).unwrap();
        store.enqueue_curiosity("high late", "r", 0.9).unwrap();
        store.enqueue_curiosity("low late", "r", 0.4).unwrap();

        let pending = store.pending_curiosity(3).unwrap();
        assert_eq!(pending[0].topic, "high late");
        assert_eq!(pending[1].topic, "low early");
        assert_eq!(pending[2].topic, "low late");
    }
}
