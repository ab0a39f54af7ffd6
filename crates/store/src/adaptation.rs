//! Self-adaptation state: operating notes, correction-derived rules, the
//! user model, and the skill/competency map.

use rusqlite::params;
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct OperatingNote {
    pub key: String,
    pub value: String,
    pub update_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserModelRow {
    pub attribute: String,
    pub value: String,
    pub confidence: f64,
    pub evidence_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillRow {
    pub domain: String,
    pub success_rate: f64,
    pub total_attempts: i64,
    pub level: String,
}

impl Store {
    // ── Operating notes ────────────────────────────────────────────────

    pub fn upsert_operating_note(&self, key: &str, value: &str) -> Result<()> {
        let now = now_iso();
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO operating_notes (note_key, note_value, created_date, last_updated, update_count)
                 VALUES (?1, ?2, ?3, ?3, 1)
                 ON CONFLICT(note_key) DO UPDATE SET
                     note_value = excluded.note_value,
                     last_updated = excluded.last_updated,
                     update_count = update_count + 1",
                params![key, value, now],
            )?;
            Ok(())
        })
    }

    pub fn operating_notes(&self, limit: usize) -> Result<Vec<OperatingNote>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT note_key, note_value, update_count FROM operating_notes
                 ORDER BY last_updated DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(OperatingNote {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        update_count: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ── Mistakes / behavioral rules ────────────────────────────────────

    pub fn insert_mistake(&self, topic: &str, correction: &str, rule: &str) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO mistakes (timestamp, topic, correction, behavioral_rule, applied_count)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![now_iso(), topic, correction, rule],
            )?;
            Ok(())
        })
    }

    pub fn recent_rules(&self, limit: usize) -> Result<Vec<String>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT behavioral_rule FROM mistakes ORDER BY timestamp DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Whether any recorded mistake topic contains the keyword.
    pub fn mistake_topic_matches(&self, keyword: &str) -> Result<bool> {
        let pattern = format!("%{}%", keyword.to_lowercase());
        let count: i64 = self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM mistakes WHERE LOWER(topic) LIKE ?1",
                [pattern],
                |r| r.get(0),
            )
        })?;
        Ok(count > 0)
    }

    // ── User model ─────────────────────────────────────────────────────

    pub fn upsert_user_model(&self, attribute: &str, value: &str, confidence: f64) -> Result<()> {
        let now = now_iso();
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO user_model (attribute, value, confidence, last_updated, evidence_count)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT(attribute) DO UPDATE SET
                     value = excluded.value,
                     confidence = MIN(1.0, confidence + 0.05),
                     last_updated = excluded.last_updated,
                     evidence_count = evidence_count + 1",
                params![attribute, value, confidence, now],
            )?;
            Ok(())
        })
    }

    pub fn user_model_rows(&self, min_confidence: f64, limit: usize) -> Result<Vec<UserModelRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT attribute, value, confidence, evidence_count FROM user_model
                 WHERE confidence >= ?1 ORDER BY evidence_count DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![min_confidence, limit], |row| {
                    Ok(UserModelRow {
                        attribute: row.get(0)?,
                        value: row.get(1)?,
                        confidence: row.get(2)?,
                        evidence_count: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ── Skills ─────────────────────────────────────────────────────────

    pub fn insert_skill_observation(
        &self,
        domain: &str,
        topic: &str,
        confidence: f64,
        message_length: usize,
    ) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO skill_observations
                    (timestamp, domain, topic, confidence_score, message_length)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![now_iso(), domain, topic, confidence, message_length as i64],
            )?;
            Ok(())
        })
    }

    /// (mean confidence, observation count) for a domain.
    pub fn skill_domain_stats(&self, domain: &str) -> Result<(f64, i64)> {
        self.with(|conn| {
            conn.query_row(
                "SELECT AVG(confidence_score), COUNT(*) FROM skill_observations
                 WHERE domain = ?1",
                [domain],
                |row| {
                    Ok((
                        row.get::<_, Option<f64>>(0)?.unwrap_or(0.5),
                        row.get(1)?,
                    ))
                },
            )
        })
    }

    pub fn upsert_skill(
        &self,
        domain: &str,
        success_rate: f64,
        total_attempts: i64,
        level: &str,
    ) -> Result<()> {
        let now = now_iso();
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO skills (skill_name, success_rate, total_attempts, skill_level, last_updated, domain)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?1)
                 ON CONFLICT(skill_name) DO UPDATE SET
                     success_rate = excluded.success_rate,
                     total_attempts = excluded.total_attempts,
                     skill_level = excluded.skill_level,
                     last_updated = excluded.last_updated",
                params![domain, success_rate, total_attempts, level, now],
            )?;
            Ok(())
        })
    }

    pub fn skills(&self, min_attempts: i64, limit: usize) -> Result<Vec<SkillRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT skill_name, success_rate, total_attempts, skill_level FROM skills
                 WHERE total_attempts >= ?1 ORDER BY success_rate DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![min_attempts, limit], |row| {
                    Ok(SkillRow {
                        domain: row.get(0)?,
                        success_rate: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        total_attempts: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        level: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Weakest domains first, for the self-authored goal review.
    pub fn weak_skills(&self, limit: usize) -> Result<Vec<SkillRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT skill_name, success_rate, total_attempts, skill_level FROM skills
                 WHERE total_attempts >= 2 ORDER BY success_rate ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(SkillRow {
                        domain: row.get(0)?,
                        success_rate: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        total_attempts: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        level: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ── Values ─────────────────────────────────────────────────────────

    pub fn top_values(&self, limit: usize) -> Result<Vec<String>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT value_statement FROM ai_values ORDER BY priority DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn insert_value(&self, statement: &str, priority: f64) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO ai_values (value_statement, priority, developed_date)
                 VALUES (?1, ?2, ?3)",
                params![statement, priority, now_iso()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operating_note_upsert_bumps_count() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_operating_note("brevity", "keep answers under five sentences")
            .unwrap();
        store
            .upsert_operating_note("brevity", "shorter still in the morning")
            .unwrap();

        let notes = store.operating_notes(10).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].update_count, 2);
        assert!(notes[0].value.contains("morning"));
    }

    #[test]
    fn user_model_confidence_is_capped() {
        let store = Store::open_in_memory().unwrap();
        for _ in 0..20 {
            store
                .upsert_user_model("technical_expertise", "high", 0.95)
                .unwrap();
        }
        let rows = store.user_model_rows(0.0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].confidence <= 1.0);
        assert_eq!(rows[0].evidence_count, 20);
    }

    #[test]
    fn mistake_topic_scan_matches_substrings() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_mistake("rust lifetimes", "that's wrong", "Always double-check lifetime advice")
            .unwrap();
        assert!(store.mistake_topic_matches("lifetimes").unwrap());
        assert!(!store.mistake_topic_matches("gardening").unwrap());
    }

    #[test]
    fn skill_upsert_replaces_aggregate() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_skill("programming", 0.6, 3, "competent").unwrap();
        store.upsert_skill("programming", 0.8, 4, "strong").unwrap();
        let skills = store.skills(1, 10).unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].level, "strong");
        assert_eq!(skills[0].total_attempts, 4);
    }
}
