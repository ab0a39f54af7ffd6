//! Per-topic mention counters backing the interest tracker. Level strings
//! are computed by the tracker and written here on every mention.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct InterestRow {
    pub topic: String,
    pub level: String,
    pub mention_count: i64,
    pub first_mention: Option<String>,
    pub last_activity: Option<String>,
}

impl Store {
    /// Record one mention of a topic. `level_for` maps the new count to its
    /// level so the level/count pairing is enforced on the same write.
    /// Returns (new_count, level).
    pub fn record_interest_mention(
        &self,
        topic: &str,
        level_for: impl Fn(i64) -> &'static str,
    ) -> Result<(i64, &'static str)> {
        let now = now_iso();
        self.tx(|tx| {
            let existing: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT id, mention_count FROM interests WHERE LOWER(topic) = LOWER(?1)",
                    [topic],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                Some((id, count)) => {
                    let new_count = count + 1;
                    let level = level_for(new_count);
                    tx.execute(
                        "UPDATE interests
                         SET mention_count = ?1, interest_level = ?2, last_activity = ?3
                         WHERE id = ?4",
                        params![new_count, level, now, id],
                    )?;
                    Ok((new_count, level))
                }
                None => {
                    let level = level_for(1);
                    tx.execute(
                        "INSERT INTO interests
                            (topic, interest_level, mention_count, first_mention, last_activity)
                         VALUES (?1, ?2, 1, ?3, ?3)",
                        params![topic, level, now],
                    )?;
                    Ok((1, level))
                }
            }
        })
    }

    pub fn top_interests(&self, limit: usize) -> Result<Vec<InterestRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT topic, interest_level, mention_count, first_mention, last_activity
                 FROM interests ORDER BY mention_count DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(InterestRow {
                        topic: row.get(0)?,
                        level: row.get(1)?,
                        mention_count: row.get(2)?,
                        first_mention: row.get(3)?,
                        last_activity: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn interest_count(&self) -> Result<i64> {
        self.with(|conn| conn.query_row("SELECT COUNT(*) FROM interests", [], |r| r.get(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(count: i64) -> &'static str {
        match count {
            1..=4 => "casual",
            5..=14 => "interested",
            _ => "deep",
        }
    }

    #[test]
    fn mentions_accumulate_and_update_level() {
        let store = Store::open_in_memory().unwrap();
        for _ in 0..4 {
            store.record_interest_mention("neuroscience", level).unwrap();
        }
        let (count, lvl) = store.record_interest_mention("neuroscience", level).unwrap();
        assert_eq!(count, 5);
        assert_eq!(lvl, "interested");

        let rows = store.top_interests(5).unwrap();
        assert_eq!(rows[0].mention_count, 5);
        assert_eq!(rows[0].level, "interested");
    }

    #[test]
    fn topic_match_is_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        store.record_interest_mention("Rust", level).unwrap();
        let (count, _) = store.record_interest_mention("rust", level).unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.interest_count().unwrap(), 1);
    }
}
