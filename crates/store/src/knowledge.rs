//! Long-term knowledge. Topic is the dedup key; the weekly synthesizer and
//! curiosity research UPSERT into it with monotone confidence.

use std::collections::HashSet;

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeFact {
    pub id: i64,
    pub topic: String,
    pub content: String,
    pub source: String,
    pub confidence: f64,
    pub learned_date: Option<String>,
    pub last_accessed: Option<String>,
    pub confirmation_count: i64,
    pub source_weeks: Vec<i64>,
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeFact> {
    let weeks_json: Option<String> = row.get(8)?;
    Ok(KnowledgeFact {
        id: row.get(0)?,
        topic: row.get(1)?,
        content: row.get(2)?,
        source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        confidence: row.get(4)?,
        learned_date: row.get(5)?,
        last_accessed: row.get(6)?,
        confirmation_count: row.get::<_, Option<i64>>(7)?.unwrap_or(1),
        source_weeks: weeks_json
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
    })
}

const FACT_COLUMNS: &str = "id, topic, content, source, confidence, learned_date, \
                            last_accessed, confirmation_count, source_weeks";

impl Store {
    /// Broad OR keyword search over topic and content, confidence-ranked,
    /// deduped by topic.
    pub fn search_knowledge(&self, keywords: &[String], limit: usize) -> Result<Vec<KnowledgeFact>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let conditions = vec!["LOWER(topic) LIKE ? OR LOWER(content) LIKE ?"; keywords.len()]
            .join(" OR ");
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM knowledge_base WHERE {conditions}
             ORDER BY confidence DESC, last_accessed DESC LIMIT ?"
        );

        let mut params: Vec<String> = Vec::with_capacity(keywords.len() * 2 + 1);
        for keyword in keywords {
            let pattern = format!("%{}%", keyword.to_lowercase());
            params.push(pattern.clone());
            params.push(pattern);
        }
        params.push(limit.to_string());

        let facts = self.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), row_to_fact)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut seen = HashSet::new();
        Ok(facts
            .into_iter()
            .filter(|fact| seen.insert(fact.topic.clone()))
            .take(limit)
            .collect())
    }

    pub fn knowledge_count(&self) -> Result<i64> {
        self.with(|conn| conn.query_row("SELECT COUNT(*) FROM knowledge_base", [], |r| r.get(0)))
    }

    /// Lowercased topics already known; curiosity uses this as its skip set.
    pub fn known_topics_lowercase(&self) -> Result<HashSet<String>> {
        self.with(|conn| {
            let mut stmt = conn.prepare("SELECT LOWER(topic) FROM knowledge_base")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut set = HashSet::new();
            for row in rows {
                set.insert(row?);
            }
            Ok(set)
        })
    }

    /// Plain insert used by night consolidation. No dedup: a repeated topic
    /// is caught later by the weekly UPSERT path.
    pub fn insert_fact(
        &self,
        topic: &str,
        content: &str,
        source: &str,
        confidence: f64,
    ) -> Result<()> {
        let now = now_iso();
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO knowledge_base
                    (topic, content, source, confidence, learned_date, last_accessed,
                     first_seen, confirmation_count, source_weeks)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5, 1, '[]')",
                params![topic, content, source, confidence, now],
            )?;
            Ok(())
        })
    }

    /// Weekly-synthesis commit. Insert when the topic is new; otherwise
    /// UPSERT: content replaced, confidence only raised, confirmation_count
    /// incremented, week appended to source_weeks. Returns true when a new
    /// row was created.
    pub fn upsert_confirmed_fact(
        &self,
        topic: &str,
        content: &str,
        confidence: f64,
        week: i64,
    ) -> Result<bool> {
        let now = now_iso();
        self.tx(|tx| {
            let existing = tx
                .query_row(
                    "SELECT id, confirmation_count, confidence, source_weeks
                     FROM knowledge_base WHERE topic = ?1",
                    [topic],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<i64>>(1)?.unwrap_or(1),
                            row.get::<_, f64>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;

            match existing {
                Some((id, count, old_confidence, weeks_json)) => {
                    let mut weeks: Vec<i64> = weeks_json
                        .and_then(|raw| serde_json::from_str(&raw).ok())
                        .unwrap_or_default();
                    if !weeks.contains(&week) {
                        weeks.push(week);
                    }
                    let weeks = serde_json::to_string(&weeks)
                        .unwrap_or_else(|_| "[]".to_string());
                    tx.execute(
                        "UPDATE knowledge_base
                         SET content = ?1, confidence = ?2, confirmation_count = ?3,
                             source_weeks = ?4, last_accessed = ?5
                         WHERE id = ?6",
                        params![
                            content,
                            old_confidence.max(confidence),
                            count + 1,
                            weeks,
                            now,
                            id
                        ],
                    )?;
                    Ok(false)
                }
                None => {
                    let weeks = serde_json::to_string(&[week])
                        .unwrap_or_else(|_| "[]".to_string());
                    tx.execute(
                        "INSERT INTO knowledge_base
                            (topic, content, source, confidence, learned_date,
                             last_accessed, first_seen, confirmation_count, source_weeks)
                         VALUES (?1, ?2, 'weekly_consolidation', ?3, ?4, ?4, ?4, 1, ?5)",
                        params![topic, content, confidence, now, weeks],
                    )?;
                    Ok(true)
                }
            }
        })
    }

    /// Curiosity-research commit at fixed low confidence. Existing topics
    /// are only touched (confidence never lowered).
    pub fn upsert_research_fact(&self, topic: &str, notes: &str) -> Result<()> {
        let now = now_iso();
        self.tx(|tx| {
            let existing = tx
                .query_row(
                    "SELECT id, confidence FROM knowledge_base WHERE topic = ?1",
                    [topic],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
                )
                .optional()?;

            match existing {
                Some((id, confidence)) => {
                    tx.execute(
                        "UPDATE knowledge_base
                         SET confidence = ?1, last_accessed = ?2 WHERE id = ?3",
                        params![confidence.max(0.4), now, id],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO knowledge_base
                            (topic, content, source, confidence, learned_date,
                             last_accessed, first_seen, confirmation_count, source_weeks)
                         VALUES (?1, ?2, 'curiosity_research', 0.4, ?3, ?3, ?3, 1, '[]')",
                        params![topic, notes, now],
                    )?;
                }
            }
            Ok(())
        })
    }

    pub fn fact_by_topic(&self, topic: &str) -> Result<Option<KnowledgeFact>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {FACT_COLUMNS} FROM knowledge_base WHERE topic = ?1"),
                [topic],
                row_to_fact,
            )
            .optional()
        })
    }
}
