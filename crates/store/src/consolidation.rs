//! The nightly consolidation run log — also the once-per-day guard.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store};

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConsolidationRun {
    pub run_date: String,
    pub conversations_processed: i64,
    pub knowledge_items_added: i64,
    pub journal_entries_written: i64,
    pub curiosity_topics_processed: i64,
    pub duration_seconds: f64,
    pub summary: String,
}

impl Store {
    /// Whether a run is already logged for the given `YYYY-MM-DD` date.
    pub fn consolidation_ran_on(&self, date: &str) -> Result<bool> {
        let count: i64 = self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM consolidation_log WHERE substr(run_date, 1, 10) = ?1",
                [date],
                |r| r.get(0),
            )
        })?;
        Ok(count > 0)
    }

    pub fn insert_consolidation_run(&self, run: &ConsolidationRun) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO consolidation_log
                    (run_date, conversations_processed, knowledge_items_added,
                     journal_entries_written, curiosity_topics_processed,
                     duration_seconds, summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run.run_date,
                    run.conversations_processed,
                    run.knowledge_items_added,
                    run.journal_entries_written,
                    run.curiosity_topics_processed,
                    run.duration_seconds,
                    run.summary
                ],
            )?;
            Ok(())
        })
    }

    pub fn consolidation_run_count(&self) -> Result<i64> {
        self.with(|conn| conn.query_row("SELECT COUNT(*) FROM consolidation_log", [], |r| r.get(0)))
    }

    pub fn last_consolidation(&self) -> Result<Option<String>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT MAX(run_date) FROM consolidation_log",
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
    fn daily_guard_matches_date_prefix() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.consolidation_ran_on("2026-08-01").unwrap());

        store
            .insert_consolidation_run(&ConsolidationRun {
                run_date: "2026-08-01T02:00:03.141592".into(),
                knowledge_items_added: 5,
                ..Default::default()
            })
            .unwrap();

        assert!(store.consolidation_ran_on("2026-08-01").unwrap());
        assert!(!store.consolidation_ran_on("2026-08-02").unwrap());
        assert_eq!(store.consolidation_run_count().unwrap(), 1);
    }
}
