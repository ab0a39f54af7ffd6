//! Personality trait storage: current values, the append-only change
//! history, and nightly snapshots.

use std::collections::HashMap;

use rusqlite::params;
use serde::Serialize;

use crate::migrate::CORE_TRAITS;
use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct TraitRow {
    pub name: String,
    pub value: f64,
    pub trait_type: String,
    pub last_updated: Option<String>,
    pub origin_story: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonalityChangeRow {
    pub timestamp: String,
    pub trait_name: String,
    pub old_value: f64,
    pub new_value: f64,
    pub reason: String,
}

impl Store {
    /// Current values of all active traits.
    pub fn load_traits(&self) -> Result<HashMap<String, f64>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT trait_name, trait_value FROM personality_traits WHERE is_active = 1",
            )?;
            let mut map = HashMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (name, value) = row?;
                map.insert(name, value);
            }
            Ok(map)
        })
    }

    pub fn trait_rows(&self) -> Result<Vec<TraitRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT trait_name, trait_value, trait_type, last_updated, origin_story
                 FROM personality_traits WHERE is_active = 1 ORDER BY trait_name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TraitRow {
                        name: row.get(0)?,
                        value: row.get(1)?,
                        trait_type: row.get(2)?,
                        last_updated: row.get(3)?,
                        origin_story: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Write new trait values and one history row per change, atomically.
    /// `changes` carries (trait, old, new, reason).
    pub fn apply_trait_changes(
        &self,
        changes: &[(String, f64, f64, String)],
        ai_version: i64,
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let timestamp = now_iso();
        self.tx(|tx| {
            let mut update = tx.prepare(
                "UPDATE personality_traits SET trait_value = ?1, last_updated = ?2
                 WHERE trait_name = ?3",
            )?;
            let mut history = tx.prepare(
                "INSERT INTO personality_history
                    (timestamp, trait_name, old_value, new_value, change_reason, ai_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (name, old_value, new_value, reason) in changes {
                update.execute(params![new_value, timestamp, name])?;
                history.execute(params![
                    timestamp, name, old_value, new_value, reason, ai_version
                ])?;
            }
            Ok(())
        })
    }

    pub fn personality_history(&self, limit: usize) -> Result<Vec<PersonalityChangeRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, trait_name, old_value, new_value, change_reason
                 FROM personality_history ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(PersonalityChangeRow {
                        timestamp: row.get(0)?,
                        trait_name: row.get(1)?,
                        old_value: row.get(2)?,
                        new_value: row.get(3)?,
                        reason: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn personality_history_count(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row("SELECT COUNT(*) FROM personality_history", [], |r| r.get(0))
        })
    }

    pub fn insert_personality_snapshot(
        &self,
        name: &str,
        data: &HashMap<String, f64>,
        snapshot_type: &str,
        description: &str,
    ) -> Result<()> {
        let payload = serde_json::to_string(data)?;
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO personality_snapshots
                    (snapshot_name, snapshot_date, snapshot_data, snapshot_type, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, now_iso(), payload, snapshot_type, description],
            )?;
            Ok(())
        })
    }

    pub fn core_trait_names(&self) -> &'static [&'static str] {
        &CORE_TRAITS
    }
}
