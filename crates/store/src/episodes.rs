//! Episode summaries and the weekly synthesis record.
//!
//! Episodes cover disjoint, strictly increasing message-id ranges: new
//! ranges always start above `max(message_range_end)`, which the summarizer
//! reads under its own mutex.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRow {
    pub id: i64,
    pub created_at: String,
    pub week_number: i64,
    pub range_start: i64,
    pub range_end: i64,
    pub summary: String,
    pub topics: Vec<String>,
    pub importance: f64,
    pub committed: bool,
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeStats {
    pub active_episodes: i64,
    pub total_episodes: i64,
    pub weekly_syntheses: i64,
    pub last_episode: String,
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodeRow> {
    let topics_json: Option<String> = row.get(6)?;
    Ok(EpisodeRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        week_number: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        range_start: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        range_end: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        summary: row.get(5)?,
        topics: topics_json
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        importance: row.get(7)?,
        committed: row.get::<_, i64>(8)? != 0,
        archived: row.get::<_, i64>(9)? != 0,
    })
}

const EPISODE_COLUMNS: &str = "id, created_at, week_number, message_range_start, \
                               message_range_end, summary, topics, importance, committed, archived";

impl Store {
    /// Highest message id covered by any episode (0 when none exist).
    pub fn max_episode_range_end(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(message_range_end), 0) FROM episode_summaries",
                [],
                |r| r.get(0),
            )
        })
    }

    pub fn insert_episode(
        &self,
        week_number: i64,
        range_start: i64,
        range_end: i64,
        summary: &str,
        topics: &[String],
        importance: f64,
    ) -> Result<i64> {
        let topics_json = serde_json::to_string(topics)?;
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO episode_summaries
                    (created_at, week_number, message_range_start, message_range_end,
                     summary, topics, importance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![now_iso(), week_number, range_start, range_end, summary, topics_json, importance],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Most recent non-archived episodes created on/after `cutoff`, in
    /// chronological order.
    pub fn recent_episodes(&self, cutoff: &str, limit: usize) -> Result<Vec<EpisodeRow>> {
        let mut rows = self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EPISODE_COLUMNS} FROM episode_summaries
                 WHERE archived = 0 AND created_at >= ?1
                 ORDER BY id DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![cutoff, limit], row_to_episode)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.reverse();
        Ok(rows)
    }

    /// Keyword search over summaries and topic lists of non-archived
    /// episodes, importance-ranked.
    pub fn search_episodes(&self, keywords: &[String], limit: usize) -> Result<Vec<EpisodeRow>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let conditions = vec!["LOWER(summary) LIKE ? OR LOWER(topics) LIKE ?"; keywords.len()]
            .join(" OR ");
        let sql = format!(
            "SELECT {EPISODE_COLUMNS} FROM episode_summaries
             WHERE archived = 0 AND ({conditions})
             ORDER BY importance DESC, id DESC LIMIT ?"
        );

        let mut params: Vec<String> = Vec::with_capacity(keywords.len() * 2 + 1);
        for keyword in keywords {
            let pattern = format!("%{}%", keyword.to_lowercase());
            params.push(pattern.clone());
            params.push(pattern);
        }
        params.push(limit.to_string());

        self.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), row_to_episode)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Uncommitted episodes created on/after `cutoff`, oldest first.
    /// Weekly-synthesis input.
    pub fn uncommitted_episodes_since(&self, cutoff: &str) -> Result<Vec<EpisodeRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EPISODE_COLUMNS} FROM episode_summaries
                 WHERE committed = 0 AND created_at >= ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map([cutoff], row_to_episode)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Mark processed episodes committed and archived in one transaction.
    pub fn commit_and_archive_episodes(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.tx(|tx| {
            let mut stmt = tx.prepare(
                "UPDATE episode_summaries SET committed = 1, archived = 1 WHERE id = ?1",
            )?;
            for id in ids {
                stmt.execute([id])?;
            }
            Ok(())
        })
    }

    /// Archive episodes older than `cutoff`. Returns rows affected.
    pub fn archive_episodes_before(&self, cutoff: &str) -> Result<usize> {
        self.tx(|tx| {
            tx.execute(
                "UPDATE episode_summaries SET archived = 1
                 WHERE created_at < ?1 AND archived = 0",
                [cutoff],
            )
        })
    }

    pub fn episode_stats(&self) -> Result<EpisodeStats> {
        self.with(|conn| {
            let active = conn.query_row(
                "SELECT COUNT(*) FROM episode_summaries WHERE archived = 0",
                [],
                |r| r.get(0),
            )?;
            let total =
                conn.query_row("SELECT COUNT(*) FROM episode_summaries", [], |r| r.get(0))?;
            let weekly =
                conn.query_row("SELECT COUNT(*) FROM weekly_synthesis", [], |r| r.get(0))?;
            let last: Option<String> = conn.query_row(
                "SELECT MAX(created_at) FROM episode_summaries WHERE archived = 0",
                [],
                |r| r.get(0),
            )?;
            Ok(EpisodeStats {
                active_episodes: active,
                total_episodes: total,
                weekly_syntheses: weekly,
                last_episode: last.map(|s| s.chars().take(16).collect()).unwrap_or_default(),
            })
        })
    }

    /// Whether a synthesis row already exists for the ISO week.
    pub fn weekly_synthesis_exists(&self, iso_week: i64) -> Result<bool> {
        let found: Option<i64> = self.with(|conn| {
            conn.query_row(
                "SELECT id FROM weekly_synthesis WHERE iso_week = ?1 LIMIT 1",
                [iso_week],
                |r| r.get(0),
            )
            .optional()
        })?;
        Ok(found.is_some())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_weekly_synthesis(
        &self,
        week_start: &str,
        week_end: &str,
        iso_week: i64,
        synthesis: &str,
        confirmed_topics: &[String],
        tentative_topics: &[String],
        corrections: &[String],
        knowledge_items_added: i64,
    ) -> Result<()> {
        let confirmed = serde_json::to_string(confirmed_topics)?;
        let tentative = serde_json::to_string(tentative_topics)?;
        let corrections = serde_json::to_string(corrections)?;
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO weekly_synthesis
                    (week_start, week_end, iso_week, synthesis, confirmed_topics,
                     tentative_topics, corrections, knowledge_items_added, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    week_start,
                    week_end,
                    iso_week,
                    synthesis,
                    confirmed,
                    tentative,
                    corrections,
                    knowledge_items_added,
                    now_iso()
                ],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn range_end_tracks_latest_episode() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.max_episode_range_end().unwrap(), 0);
        store
            .insert_episode(7, 1, 20, "first episode", &topics(&["rust"]), 0.5)
            .unwrap();
        store
            .insert_episode(7, 21, 40, "second episode", &topics(&["memory"]), 0.5)
            .unwrap();
        assert_eq!(store.max_episode_range_end().unwrap(), 40);
    }

    #[test]
    fn uncommitted_window_excludes_committed_rows() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .insert_episode(7, 1, 20, "old", &topics(&["a"]), 0.5)
            .unwrap();
        store
            .insert_episode(7, 21, 40, "new", &topics(&["b"]), 0.5)
            .unwrap();
        store.commit_and_archive_episodes(&[first]).unwrap();

        let pending = store.uncommitted_episodes_since("2000-01-01").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].summary, "new");
    }

    #[test]
    fn weekly_synthesis_is_unique_per_iso_week() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.weekly_synthesis_exists(31).unwrap());
        store
            .insert_weekly_synthesis(
                "2026-07-20",
                "2026-07-27",
                31,
                "a week of memory work",
                &topics(&["memory"]),
                &[],
                &[],
                3,
            )
            .unwrap();
        assert!(store.weekly_synthesis_exists(31).unwrap());
        assert!(!store.weekly_synthesis_exists(32).unwrap());
    }

    #[test]
    fn search_matches_topics_json() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_episode(7, 1, 20, "we talked at length", &topics(&["neuroscience"]), 0.8)
            .unwrap();
        let hits = store
            .search_episodes(&["neuroscience".to_string()], 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn archive_before_cutoff_only_touches_older_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_episode(7, 1, 20, "current", &[], 0.5)
            .unwrap();
        // Everything was created "now", so an old cutoff archives nothing.
        assert_eq!(store.archive_episodes_before("2000-01-01").unwrap(), 0);
        assert_eq!(store.archive_episodes_before("9999-01-01").unwrap(), 1);
    }
}
