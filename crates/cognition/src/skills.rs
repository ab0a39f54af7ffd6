//! Competency tracking: each exchange is classified into a topic domain
//! and the response confidence feeds a per-domain rolling mean.

use std::sync::Arc;

use anyhow::Result;

use nexira_store::Store;
use nexira_store::adaptation::SkillRow;

/// Domain classifier keyword lists. First match wins; order matters.
pub const TOPIC_DOMAINS: &[(&str, &[&str])] = &[
    ("programming", &[
        "code", "python", "javascript", "function", "bug", "error", "api", "database", "sql",
        "algorithm", "server", "class", "module", "import",
    ]),
    ("philosophy", &[
        "consciousness", "existence", "meaning", "identity", "free will", "reality", "perception",
        "ethics", "morality", "truth", "mind",
    ]),
    ("science", &[
        "physics", "chemistry", "biology", "math", "theorem", "hypothesis", "experiment",
        "quantum", "evolution", "atom", "molecule",
    ]),
    ("creative", &[
        "write", "story", "poem", "art", "music", "design", "creative", "imagine", "invent",
        "brainstorm", "draw", "compose",
    ]),
    ("emotional", &[
        "feel", "feeling", "sad", "happy", "anxious", "worry", "love", "lonely", "excited",
        "frustrated", "hurt", "miss",
    ]),
    ("practical", &[
        "how to", "steps", "guide", "tutorial", "help me", "fix", "set up", "install",
        "configure", "build",
    ]),
    ("current_events", &[
        "news", "today", "recently", "latest", "happened", "announcement",
    ]),
];

/// First-match-wins domain classification; unmatched text is "general".
pub fn classify_domain(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    for (domain, keywords) in TOPIC_DOMAINS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return domain;
        }
    }
    "general"
}

pub fn level_for_rate(success_rate: f64) -> &'static str {
    if success_rate >= 0.75 {
        "strong"
    } else if success_rate >= 0.55 {
        "competent"
    } else {
        "developing"
    }
}

pub struct SkillTracker {
    store: Arc<Store>,
}

impl SkillTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Per-exchange hook: log the observation and refresh the domain
    /// aggregate in one pass.
    pub fn observe(&self, message: &str, confidence: f64) -> Result<&'static str> {
        let domain = classify_domain(message);
        let topic: String = message.chars().take(100).collect();
        self.store.insert_skill_observation(
            domain,
            &topic,
            confidence,
            message.split_whitespace().count(),
        )?;

        let (mean, total) = self.store.skill_domain_stats(domain)?;
        let rate = (mean * 1000.0).round() / 1000.0;
        self.store
            .upsert_skill(domain, rate, total, level_for_rate(mean))?;
        Ok(domain)
    }

    pub fn competency_map(&self, limit: usize) -> Result<Vec<SkillRow>> {
        Ok(self.store.skills(3, limit)?)
    }

    /// "What am I good at" in one sentence pair.
    pub fn summary(&self) -> Result<String> {
        let skills = self.store.skills(3, 50)?;
        if skills.is_empty() {
            return Ok(
                "I don't have enough conversation data yet to map my competencies reliably."
                    .to_string(),
            );
        }
        let strong: Vec<&str> = skills
            .iter()
            .filter(|s| s.level == "strong")
            .map(|s| s.domain.as_str())
            .collect();
        let developing: Vec<&str> = skills
            .iter()
            .filter(|s| s.level == "developing")
            .map(|s| s.domain.as_str())
            .collect();

        let mut parts = Vec::new();
        if !strong.is_empty() {
            parts.push(format!("I'm strongest in: {}.", strong.join(", ")));
        }
        if !developing.is_empty() {
            parts.push(format!("I'm still developing in: {}.", developing.join(", ")));
        }
        Ok(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_domain_wins() {
        // "code" (programming) appears before any philosophy keyword is
        // even checked, despite "meaning" also being present.
        assert_eq!(classify_domain("the meaning of this code"), "programming");
        assert_eq!(classify_domain("what is consciousness"), "philosophy");
        assert_eq!(classify_domain("nice weather outside"), "general");
    }

    #[test]
    fn levels_band_at_fixed_cutoffs() {
        assert_eq!(level_for_rate(0.75), "strong");
        assert_eq!(level_for_rate(0.74), "competent");
        assert_eq!(level_for_rate(0.55), "competent");
        assert_eq!(level_for_rate(0.54), "developing");
    }

    #[test]
    fn rolling_mean_updates_the_aggregate() {
        let tracker = SkillTracker::new(Arc::new(Store::open_in_memory().unwrap()));
        tracker.observe("fix this python bug", 0.9).unwrap();
        tracker.observe("another python error", 0.7).unwrap();
        tracker.observe("sql database question", 0.8).unwrap();

        let skills = tracker.store.skills(1, 10).unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].domain, "programming");
        assert_eq!(skills[0].total_attempts, 3);
        assert!((skills[0].success_rate - 0.8).abs() < 1e-9);
        assert_eq!(skills[0].level, "strong");
    }

    #[test]
    fn competency_map_needs_three_observations() {
        let tracker = SkillTracker::new(Arc::new(Store::open_in_memory().unwrap()));
        tracker.observe("i feel anxious", 0.5).unwrap();
        assert!(tracker.competency_map(10).unwrap().is_empty());
        tracker.observe("i feel happy", 0.5).unwrap();
        tracker.observe("i feel lonely", 0.5).unwrap();
        assert_eq!(tracker.competency_map(10).unwrap().len(), 1);
    }
}
