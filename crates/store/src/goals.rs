//! Typed goals with clamped progress accounting.

use rusqlite::params;
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Serialize)]
pub struct GoalRow {
    pub id: i64,
    pub name: String,
    pub goal_type: String,
    pub current: f64,
    pub target: f64,
    pub progress: f64,
    pub status: String,
    pub created_date: Option<String>,
    pub authored_by: String,
    pub description: Option<String>,
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<GoalRow> {
    Ok(GoalRow {
        id: row.get(0)?,
        name: row.get(1)?,
        goal_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        current: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
        target: row.get::<_, Option<f64>>(4)?.unwrap_or(1.0),
        progress: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        status: row.get(6)?,
        created_date: row.get(7)?,
        authored_by: row
            .get::<_, Option<String>>(8)?
            .unwrap_or_else(|| "system".to_string()),
        description: row.get(9)?,
    })
}

const GOAL_COLUMNS: &str = "id, goal_name, goal_type, current_value, target_value, progress, \
                            status, created_date, authored_by, description";

impl Store {
    pub fn insert_goal(
        &self,
        name: &str,
        goal_type: &str,
        target: f64,
        description: &str,
        authored_by: &str,
    ) -> Result<i64> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO goals
                    (goal_name, goal_type, target_value, current_value, progress,
                     created_date, status, authored_by, description)
                 VALUES (?1, ?2, ?3, 0.0, 0.0, ?4, 'active', ?5, ?6)",
                params![name, goal_type, target, now_iso(), authored_by, description],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn active_goals(&self) -> Result<Vec<GoalRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GOAL_COLUMNS} FROM goals WHERE status = 'active'
                 ORDER BY progress DESC"
            ))?;
            let rows = stmt
                .query_map([], row_to_goal)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn active_goals_of_type(&self, goal_type: &str) -> Result<Vec<GoalRow>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GOAL_COLUMNS} FROM goals
                 WHERE status = 'active' AND goal_type = ?1"
            ))?;
            let rows = stmt
                .query_map([goal_type], row_to_goal)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn active_goal_count(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM goals WHERE status = 'active'",
                [],
                |r| r.get(0),
            )
        })
    }

    pub fn active_self_authored_count(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM goals WHERE status = 'active' AND authored_by = 'self'",
                [],
                |r| r.get(0),
            )
        })
    }

    pub fn set_goal_progress(&self, id: i64, current: f64, progress: f64) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "UPDATE goals SET current_value = ?1, progress = ?2 WHERE id = ?3",
                params![current, progress, id],
            )?;
            Ok(())
        })
    }

    pub fn complete_goal(&self, id: i64) -> Result<()> {
        self.tx(|tx| {
            tx.execute("UPDATE goals SET status = 'completed' WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_list_active() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_goal("Build a knowledge base of 50 topics", "knowledge", 50.0, "", "system")
            .unwrap();
        let goals = store.active_goals().unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].goal_type, "knowledge");
        assert_eq!(goals[0].authored_by, "system");
    }

    #[test]
    fn completed_goals_leave_the_active_set() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .insert_goal("Form a hypothesis", "philosophical", 1.0, "", "system")
            .unwrap();
        store.set_goal_progress(id, 1.0, 100.0).unwrap();
        store.complete_goal(id).unwrap();
        assert_eq!(store.active_goal_count().unwrap(), 0);
    }

    #[test]
    fn self_authored_counted_separately() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_goal("seeded", "growth", 10.0, "", "system")
            .unwrap();
        store
            .insert_goal("my own aim", "self_authored", 1.0, "because", "self")
            .unwrap();
        assert_eq!(store.active_self_authored_count().unwrap(), 1);
        assert_eq!(store.active_goal_count().unwrap(), 2);
    }
}
