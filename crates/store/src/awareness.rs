//! Per-response self-awareness samples and their rollups.

use rusqlite::params;
use serde::Serialize;

use crate::{Result, Store, now_iso};

#[derive(Debug, Clone, Copy, Default)]
pub struct AwarenessScores {
    pub self_ref: f64,
    pub uncertainty: f64,
    pub meta_cognition: f64,
    pub composite: f64,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AwarenessCurrent {
    pub composite: f64,
    pub self_ref: f64,
    pub uncertainty: f64,
    pub meta: f64,
    pub samples: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwarenessTrendPoint {
    pub date: String,
    pub composite: f64,
    pub self_ref: f64,
    pub uncertainty: f64,
    pub meta: f64,
    pub samples: i64,
}

impl Store {
    pub fn insert_awareness_sample(&self, scores: AwarenessScores, sample: &str) -> Result<()> {
        self.tx(|tx| {
            tx.execute(
                "INSERT INTO self_awareness_log
                    (timestamp, self_ref_score, uncertainty_score, meta_cognition_score,
                     composite_score, response_sample, word_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    now_iso(),
                    scores.self_ref,
                    scores.uncertainty,
                    scores.meta_cognition,
                    scores.composite,
                    sample,
                    scores.word_count as i64
                ],
            )?;
            Ok(())
        })
    }

    /// Rolling averages over samples at/after `cutoff` (ISO timestamp).
    pub fn awareness_since(&self, cutoff: &str) -> Result<AwarenessCurrent> {
        self.with(|conn| {
            conn.query_row(
                "SELECT AVG(composite_score), AVG(self_ref_score), AVG(uncertainty_score),
                        AVG(meta_cognition_score), COUNT(*)
                 FROM self_awareness_log WHERE timestamp >= ?1",
                [cutoff],
                |row| {
                    Ok(AwarenessCurrent {
                        composite: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                        self_ref: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        uncertainty: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                        meta: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                        samples: row.get(4)?,
                    })
                },
            )
        })
    }

    /// Daily averages at/after `cutoff`, oldest first, capped at `points`.
    pub fn awareness_trend(&self, cutoff: &str, points: usize) -> Result<Vec<AwarenessTrendPoint>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT substr(timestamp, 1, 10) AS day,
                        AVG(composite_score), AVG(self_ref_score),
                        AVG(uncertainty_score), AVG(meta_cognition_score), COUNT(*)
                 FROM self_awareness_log
                 WHERE timestamp >= ?1
                 GROUP BY day ORDER BY day ASC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cutoff, points], |row| {
                    Ok(AwarenessTrendPoint {
                        date: row.get(0)?,
                        composite: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        self_ref: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                        uncertainty: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                        meta: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                        samples: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
