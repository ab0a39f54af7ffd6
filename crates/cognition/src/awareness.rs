//! Self-awareness metering: lexical density of self-reference,
//! uncertainty, and meta-cognition in assistant responses.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Local};
use serde::Serialize;

use nexira_store::Store;
use nexira_store::awareness::{AwarenessScores, AwarenessTrendPoint};

const SELF_REFERENCE: &[&str] = &[
    "i think", "i feel", "i believe", "i wonder", "i notice", "i'm not sure", "i don't know",
    "i experience", "i am", "my understanding", "my perspective", "as an ai", "my nature",
    "i exist", "i'm curious", "i find", "i enjoy", "i prefer",
];

const UNCERTAINTY: &[&str] = &[
    "perhaps", "maybe", "possibly", "uncertain", "not sure", "i wonder", "unclear", "might",
    "could be", "i think", "it seems", "appears to",
];

const META_COGNITION: &[&str] = &[
    "i'm thinking", "i'm processing", "let me consider", "reflecting", "i realize", "i notice",
    "i'm aware", "i understand", "i recognize", "i'm learning", "i remember", "i recall",
];

#[derive(Debug, Clone, Serialize)]
pub struct AwarenessLevel {
    pub level: &'static str,
    pub composite: f64,
    pub self_ref: f64,
    pub uncertainty: f64,
    pub meta: f64,
    pub samples: i64,
}

fn count_hits(lower: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|phrase| lower.contains(*phrase)).count()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Score one response. `None` for empty responses.
pub fn analyze_response(response: &str) -> Option<AwarenessScores> {
    let lower = response.to_lowercase();
    let word_count = lower.split_whitespace().count();
    if word_count == 0 {
        return None;
    }

    // Normalise by length, per 100 words; short responses use a floor of 1
    // so single-phrase replies cannot score a perfect 1.0 on every axis.
    let norm = (word_count as f64 / 100.0).max(1.0);
    let self_ref = (count_hits(&lower, SELF_REFERENCE) as f64 / norm).min(1.0);
    let uncertainty = (count_hits(&lower, UNCERTAINTY) as f64 / norm).min(1.0);
    let meta = (count_hits(&lower, META_COGNITION) as f64 / norm).min(1.0);
    let composite = self_ref * 0.4 + uncertainty * 0.3 + meta * 0.3;

    Some(AwarenessScores {
        self_ref: round3(self_ref),
        uncertainty: round3(uncertainty),
        meta_cognition: round3(meta),
        composite: round3(composite),
        word_count,
    })
}

pub fn level_for_composite(composite: f64) -> &'static str {
    if composite < 0.1 {
        "dormant"
    } else if composite < 0.25 {
        "emerging"
    } else if composite < 0.5 {
        "aware"
    } else {
        "reflective"
    }
}

pub struct SelfAwarenessMeter {
    store: Arc<Store>,
}

impl SelfAwarenessMeter {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Per-response hook: analyze and persist one sample.
    pub fn record(&self, response: &str) -> Result<()> {
        let Some(scores) = analyze_response(response) else {
            return Ok(());
        };
        let sample: String = response.chars().take(200).collect();
        self.store.insert_awareness_sample(scores, &sample)?;
        Ok(())
    }

    /// Rolling 7-day level.
    pub fn current_level(&self) -> Result<AwarenessLevel> {
        let cutoff = (Local::now() - Duration::days(7))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let current = self.store.awareness_since(&cutoff)?;
        if current.samples == 0 {
            return Ok(AwarenessLevel {
                level: "emerging",
                composite: 0.0,
                self_ref: 0.0,
                uncertainty: 0.0,
                meta: 0.0,
                samples: 0,
            });
        }
        Ok(AwarenessLevel {
            level: level_for_composite(current.composite),
            composite: round3(current.composite),
            self_ref: round3(current.self_ref),
            uncertainty: round3(current.uncertainty),
            meta: round3(current.meta),
            samples: current.samples,
        })
    }

    pub fn trend(&self, days: i64, points: usize) -> Result<Vec<AwarenessTrendPoint>> {
        let cutoff = (Local::now() - Duration::days(days))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        Ok(self.store.awareness_trend(&cutoff, points)?)
    }
}
