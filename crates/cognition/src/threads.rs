//! Conversation threading: clustering user messages into named threads by
//! keyword overlap and time proximity.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use tracing::info;

use nexira_store::Store;
use nexira_store::threads::ThreadRow;

/// Keyword overlap (Jaccard) needed to join an existing thread.
const MIN_THREAD_SIMILARITY: f64 = 0.25;
/// Threads idle longer than this never accept new messages.
const MAX_THREAD_GAP_HOURS: i64 = 48;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is",
    "it", "its", "this", "that", "these", "those", "i", "you", "he", "she", "we", "they",
    "what", "how", "why", "when", "where", "who", "do", "does", "did", "have", "has", "had",
    "be", "been", "am", "are", "was", "were", "will", "would", "could", "should", "may",
    "might", "can", "just", "also", "so", "if", "then", "there", "my", "your", "me", "him",
    "her", "us", "them", "not", "no", "yes", "ok", "okay",
];

pub fn extract_keywords(text: &str) -> HashSet<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|word| word.len() >= 3 && !stop.contains(word))
        .map(|word| word.to_string())
        .collect()
}

pub fn similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

fn name_thread(keywords: &HashSet<String>) -> String {
    let mut by_length: Vec<&String> = keywords.iter().collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let picks: Vec<String> = by_length
        .into_iter()
        .take(3)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if picks.is_empty() {
        "Untitled thread".to_string()
    } else {
        picks.join(" · ")
    }
}

pub struct ThreadingEngine {
    store: Arc<Store>,
}

impl ThreadingEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Attach one message to its best-matching recent thread, or start a
    /// new one. Returns the thread id.
    pub fn assign_message(&self, message_id: i64, content: &str, timestamp: &str) -> Result<i64> {
        let keywords = extract_keywords(content);
        if keywords.is_empty() {
            let name = name_thread(&keywords);
            let keyword_list: Vec<String> = keywords.into_iter().collect();
            return Ok(self
                .store
                .create_thread(&name, &keyword_list, timestamp, message_id)?);
        }

        let cutoff = NaiveDateTime::parse_from_str(
            &timestamp.chars().take(26).collect::<String>(),
            "%Y-%m-%dT%H:%M:%S%.6f",
        )
        .map(|parsed| {
            (parsed - Duration::hours(MAX_THREAD_GAP_HOURS))
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string()
        })
        .unwrap_or_else(|_| "0000".to_string());

        let candidates = self.store.active_threads_since(&cutoff, 20)?;
        let best = candidates
            .iter()
            .map(|thread| {
                let existing: HashSet<String> = thread.keywords.iter().cloned().collect();
                (thread, similarity(&keywords, &existing))
            })
            .filter(|(_, score)| *score > MIN_THREAD_SIMILARITY)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((thread, _)) => {
                let mut merged: HashSet<String> = thread.keywords.iter().cloned().collect();
                merged.extend(keywords);
                let mut merged: Vec<String> = merged.into_iter().collect();
                merged.sort();
                merged.truncate(30);
                self.store
                    .append_to_thread(thread.id, &merged, timestamp, message_id)?;
                Ok(thread.id)
            }
            None => {
                let name = name_thread(&keywords);
                let mut keyword_list: Vec<String> = keywords.into_iter().collect();
                keyword_list.sort();
                Ok(self
                    .store
                    .create_thread(&name, &keyword_list, timestamp, message_id)?)
            }
        }
    }

    /// Re-thread every user message from scratch.
    pub fn rebuild(&self) -> Result<usize> {
        self.store.clear_threads()?;
        let messages = self.store.all_user_messages()?;
        let count = messages.len();
        for (id, content, timestamp) in messages {
            self.assign_message(id, &content, &timestamp)?;
        }
        info!(messages = count, "thread rebuild complete");
        Ok(count)
    }

    pub fn threads(&self, limit: usize) -> Result<Vec<ThreadRow>> {
        Ok(self.store.threads(limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn keyword_extraction_drops_stop_words() {
        let extracted = extract_keywords("How does the memory system work?");
        assert!(extracted.contains("memory"));
        assert!(extracted.contains("system"));
        assert!(!extracted.contains("how"));
        assert!(!extracted.contains("the"));
    }

    #[test]
    fn similarity_is_jaccard() {
        let a = keywords(&["memory", "system", "design"]);
        let b = keywords(&["memory", "system", "testing"]);
        assert!((similarity(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(similarity(&a, &keywords(&[])), 0.0);
    }

    #[test]
    fn related_messages_share_a_thread() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = ThreadingEngine::new(store.clone());

        store
            .log_exchange("main_ui", "rust memory model details", "a", 0.5, 0.5, &[], 1)
            .unwrap();
        store
            .log_exchange("main_ui", "more rust memory questions", "a", 0.5, 0.5, &[], 1)
            .unwrap();
        store
            .log_exchange("main_ui", "gardening tomatoes advice", "a", 0.5, 0.5, &[], 1)
            .unwrap();

        let first = engine
            .assign_message(1, "rust memory model details", "2026-08-01T10:00:00.000000")
            .unwrap();
        let second = engine
            .assign_message(3, "more rust memory questions", "2026-08-01T11:00:00.000000")
            .unwrap();
        let third = engine
            .assign_message(5, "gardening tomatoes advice", "2026-08-01T12:00:00.000000")
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);

        let threads = engine.threads(10).unwrap();
        assert_eq!(threads.len(), 2);
        let rust_thread = threads.iter().find(|t| t.id == first).unwrap();
        assert_eq!(rust_thread.message_count, 2);
    }

    #[test]
    fn stale_threads_do_not_absorb_new_messages() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = ThreadingEngine::new(store.clone());
        store
            .log_exchange("main_ui", "rust memory model", "a", 0.5, 0.5, &[], 1)
            .unwrap();
        store
            .log_exchange("main_ui", "rust memory again", "a", 0.5, 0.5, &[], 1)
            .unwrap();

        let first = engine
            .assign_message(1, "rust memory model", "2026-08-01T10:00:00.000000")
            .unwrap();
        // Three days later: outside the 48-hour window.
        let later = engine
            .assign_message(3, "rust memory again", "2026-08-04T10:00:00.000000")
            .unwrap();
        assert_ne!(first, later);
    }

    #[test]
    fn rebuild_threads_every_user_message() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = ThreadingEngine::new(store.clone());
        for i in 0..3 {
            store
                .log_exchange("main_ui", &format!("topic {i} discussion"), "a", 0.5, 0.5, &[], 1)
                .unwrap();
        }
        let rebuilt = engine.rebuild().unwrap();
        assert_eq!(rebuilt, 3);
        assert!(!engine.threads(10).unwrap().is_empty());
    }
}
