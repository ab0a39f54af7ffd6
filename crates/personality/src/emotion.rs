//! The in-memory emotional state. Not persisted; it resets neutral on
//! startup and drifts over the session.

use std::collections::BTreeMap;

use serde::Serialize;

const DECAY_RATE: f64 = 0.05;

#[derive(Debug, Clone, Serialize)]
pub struct EmotionalState {
    emotions: BTreeMap<&'static str, f64>,
}

impl Default for EmotionalState {
    fn default() -> Self {
        let mut emotions = BTreeMap::new();
        emotions.insert("curiosity", 0.5);
        emotions.insert("satisfaction", 0.5);
        emotions.insert("frustration", 0.0);
        emotions.insert("excitement", 0.5);
        emotions.insert("concern", 0.0);
        emotions.insert("pride", 0.3);
        emotions.insert("embarrassment", 0.0);
        Self { emotions }
    }
}

impl EmotionalState {
    /// Shift emotions after an exchange. `feedback` is the explicit
    /// positive/negative signal from the feedback endpoint when present.
    pub fn update(&mut self, message: &str, feedback: Option<&str>) {
        match feedback {
            Some("positive") => {
                self.raise("satisfaction", 0.15);
                self.raise("pride", 0.10);
            }
            Some("negative") => {
                self.raise("frustration", 0.20);
                self.raise("concern", 0.15);
            }
            _ => {}
        }

        if message.contains('?') {
            self.raise("curiosity", 0.10);
        }

        for emotion in ["frustration", "embarrassment", "concern"] {
            self.lower(emotion, DECAY_RATE);
        }
    }

    fn raise(&mut self, emotion: &'static str, amount: f64) {
        let value = self.emotions.entry(emotion).or_insert(0.0);
        *value = (*value + amount).min(1.0);
    }

    fn lower(&mut self, emotion: &'static str, amount: f64) {
        let value = self.emotions.entry(emotion).or_insert(0.0);
        *value = (*value - amount).max(0.0);
    }

    pub fn mean(&self) -> f64 {
        if self.emotions.is_empty() {
            return 0.0;
        }
        self.emotions.values().sum::<f64>() / self.emotions.len() as f64
    }

    pub fn get(&self, emotion: &str) -> f64 {
        self.emotions.get(emotion).copied().unwrap_or(0.0)
    }

    /// Prompt block: only emotions above 0.3 are worth mentioning.
    pub fn format_block(&self) -> String {
        let active: Vec<String> = self
            .emotions
            .iter()
            .filter(|(_, level)| **level > 0.3)
            .map(|(emotion, level)| {
                let mut name: Vec<char> = emotion.chars().collect();
                name[0] = name[0].to_ascii_uppercase();
                format!("- {}: {level:.2}", name.into_iter().collect::<String>())
            })
            .collect();
        if active.is_empty() {
            "- Calm and balanced".to_string()
        } else {
            active.join("\n")
        }
    }
}
