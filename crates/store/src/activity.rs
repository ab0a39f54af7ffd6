//! User-visible audit log of autonomous actions.

use rusqlite::params;
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub id: i64,
    pub timestamp: String,
    pub event_type: String,
    pub label: String,
    pub detail: String,
    pub extra: Option<String>,
}

impl Store {
    pub fn log_activity(
        &self,
        event_type: &str,
        label: &str,
        detail: &str,
        extra: Option<&str>,
    ) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO activity_log (timestamp, type, label, detail, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![now_iso(), event_type, label, detail, extra],
            )?;
            Ok(())
        })
    }

    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, type, label, detail, extra FROM activity_log
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(ActivityRow {
                        id: row.get(0)?,
                        timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        event_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        label: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        detail: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        extra: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_entries_come_first() {
        let store = Store::open_in_memory().unwrap();
        store.log_activity("search", "web search", "rust news", None).unwrap();
        store
            .log_activity("moltbook", "posted", "Hello world", Some("{\"post_id\":\"1\"}"))
            .unwrap();

        let rows = store.recent_activity(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_type, "moltbook");
        assert_eq!(rows[1].event_type, "search");
    }
}
