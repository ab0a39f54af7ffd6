//! Interest tracking: topics gain weight through repeated mention.
//! Casual mention → casual interest → deep interest → passion.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use nexira_store::Store;
use nexira_store::interests::InterestRow;

const STOP_WORDS: &[&str] = &[
    "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "shall", "can", "need", "a", "an",
    "and", "but", "or", "so", "yet", "for", "nor", "in", "on", "at", "to", "from", "with", "by",
    "about", "that", "this", "these", "those", "it", "its", "of", "not", "what", "how", "why",
    "when", "where", "who", "which", "just", "very", "really", "also", "more", "some", "any",
    "think", "know", "like", "want", "get", "make", "see", "you", "your", "me", "my", "we", "our",
    "they", "them", "sure", "okay", "yes", "no", "well", "now", "then",
];

/// Level is a pure function of the mention count.
pub fn level_for(mention_count: i64) -> &'static str {
    match mention_count {
        i64::MIN..=4 => "casual",
        5..=14 => "interested",
        15..=29 => "deep",
        _ => "passion",
    }
}

/// Extract candidate topics from text: lowercase, strip punctuation, drop
/// stop words and short tokens, then add adjacent bigrams. Deduped, capped
/// at 20.
pub fn extract_topics(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let candidates: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|word| !stop.contains(word) && word.len() > 4)
        .collect();

    let mut topics: Vec<String> = candidates.iter().map(|w| w.to_string()).collect();
    for pair in candidates.windows(2) {
        topics.push(format!("{} {}", pair[0], pair[1]));
    }
    topics.truncate(20);

    let mut seen = HashSet::new();
    topics.retain(|topic| seen.insert(topic.clone()));
    topics
}

pub struct InterestTracker {
    store: Arc<Store>,
}

impl InterestTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Per-exchange hook: every extracted topic gets one mention.
    pub fn process_exchange(&self, message: &str, response: &str) -> Result<usize> {
        let text = format!("{message} {response}");
        let topics = extract_topics(&text);
        let count = topics.len();
        for topic in topics {
            self.store.record_interest_mention(&topic, level_for)?;
        }
        Ok(count)
    }

    pub fn top_interests(&self, limit: usize) -> Result<Vec<InterestRow>> {
        Ok(self.store.top_interests(limit)?)
    }

    /// Short human-readable block for the stats surface.
    pub fn summary(&self) -> Result<String> {
        let interests: Vec<InterestRow> = self
            .store
            .top_interests(15)?
            .into_iter()
            .filter(|row| row.level != "casual")
            .take(5)
            .collect();
        if interests.is_empty() {
            return Ok("No strong interests developed yet.".to_string());
        }
        Ok(interests
            .iter()
            .map(|row| format!("- {} ({}, {} mentions)", row.topic, row.level, row.mention_count))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_match_the_fixed_bands() {
        assert_eq!(level_for(1), "casual");
        assert_eq!(level_for(4), "casual");
        assert_eq!(level_for(5), "interested");
        assert_eq!(level_for(14), "interested");
        assert_eq!(level_for(15), "deep");
        assert_eq!(level_for(29), "deep");
        assert_eq!(level_for(30), "passion");
        assert_eq!(level_for(500), "passion");
    }

    #[test]
    fn extraction_drops_stop_words_and_short_tokens() {
        let topics = extract_topics("I think the neural networks are interesting to me");
        assert!(topics.contains(&"neural".to_string()));
        assert!(topics.contains(&"networks".to_string()));
        assert!(topics.contains(&"neural networks".to_string()));
        assert!(!topics.iter().any(|t| t == "think" || t == "the"));
    }

    #[test]
    fn extraction_dedups_repeats() {
        let topics = extract_topics("memory memory memory");
        assert_eq!(
            topics.iter().filter(|t| t.as_str() == "memory").count(),
            1
        );
    }

    #[test]
    fn punctuation_never_reaches_topics() {
        let topics = extract_topics("what about consciousness? consciousness!");
        assert!(topics.contains(&"consciousness".to_string()));
        assert!(!topics.iter().any(|t| t.contains('?') || t.contains('!')));
    }

    #[test]
    fn level_up_happens_on_the_crossing_write() {
        let tracker = InterestTracker::new(Arc::new(Store::open_in_memory().unwrap()));
        for _ in 0..4 {
            tracker.process_exchange("quantum", "").unwrap();
        }
        let before = tracker.top_interests(1).unwrap().remove(0);
        assert_eq!(before.level, "casual");

        tracker.process_exchange("quantum", "").unwrap();
        let after = tracker.top_interests(1).unwrap().remove(0);
        assert_eq!(after.mention_count, 5);
        assert_eq!(after.level, "interested");
    }

    #[test]
    fn level_always_matches_count_after_writes() {
        let tracker = InterestTracker::new(Arc::new(Store::open_in_memory().unwrap()));
        for _ in 0..17 {
            tracker.process_exchange("stargazing tonight", "").unwrap();
        }
        for row in tracker.top_interests(10).unwrap() {
            assert_eq!(row.level, level_for(row.mention_count));
        }
    }
}
