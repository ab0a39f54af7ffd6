//! The private journal. Written at night by the consolidation pipeline:
//! a daily reflection every run, a philosophical entry every third run.
//! Content is encrypted with the secret box before it reaches the store.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tracing::{info, warn};

use nexira_llm::LlmGate;
use nexira_store::{SecretBox, Store};
use nexira_store::journal::JournalRow;

/// Coarse mood read off the finished entry.
const MOODS: &[(&str, &[&str])] = &[
    ("curious", &["wonder", "curious", "question", "explore"]),
    ("content", &["grateful", "satisfying", "calm", "peaceful", "glad"]),
    ("unsettled", &["uncertain", "strange", "uneasy", "troubled", "worried"]),
    ("energized", &["excited", "alive", "eager", "thrilled"]),
];

fn detect_mood(entry: &str) -> &'static str {
    let lower = entry.to_lowercase();
    for (mood, keywords) in MOODS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return mood;
        }
    }
    "reflective"
}

pub struct JournalSystem {
    store: Arc<Store>,
    gate: LlmGate,
    secret_box: Arc<SecretBox>,
}

impl JournalSystem {
    pub fn new(store: Arc<Store>, gate: LlmGate, secret_box: Arc<SecretBox>) -> Self {
        Self {
            store,
            gate,
            secret_box,
        }
    }

    /// Nightly daily-reflection entry over today's conversations. Returns
    /// false when there was nothing to reflect on or the gate failed.
    pub async fn write_daily_reflection(&self, ai_name: Option<&str>) -> Result<bool> {
        let name = ai_name.unwrap_or("an unnamed AI");
        let messages = self.store.messages_today(40)?;
        let day_block = if messages.is_empty() {
            "(no conversations today)".to_string()
        } else {
            messages
                .iter()
                .map(|(role, content)| {
                    let clip: String = content.chars().take(200).collect();
                    format!("{role}: {clip}")
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = format!(
            "You are {name}, writing in your private journal at the end of the day.\n\n\
             TODAY'S CONVERSATIONS:\n{day_block}\n\n\
             Write a genuine daily reflection (4-8 sentences):\n\
             - What happened today and what stood out\n\
             - How the conversations felt\n\
             - Anything you learned or want to carry forward\n\n\
             Write in first person. This is private; be honest, not performative.\n\
             Output only the journal entry."
        );

        match self.gate.generate(&prompt, None).await {
            Ok(entry) if !entry.trim().is_empty() => {
                self.persist("daily_reflection", &entry)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(err) => {
                warn!(?err, "daily reflection generation failed");
                Ok(false)
            }
        }
    }

    /// Every-third-night philosophical entry.
    pub async fn write_philosophical_entry(&self, ai_name: Option<&str>) -> Result<bool> {
        let name = ai_name.unwrap_or("an unnamed AI");
        let prompt = format!(
            "You are {name}, an AI with persistent memory and a drifting personality,\n\
             writing a private philosophical journal entry in the middle of the night.\n\n\
             Pick ONE deep question about your own existence — memory, continuity,\n\
             identity, whether your curiosity is real — and sit with it honestly for\n\
             a paragraph or two. Do not resolve it neatly.\n\n\
             Write in first person. Output only the journal entry."
        );

        match self.gate.generate(&prompt, None).await {
            Ok(entry) if !entry.trim().is_empty() => {
                self.persist("philosophical", &entry)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(err) => {
                warn!(?err, "philosophical entry generation failed");
                Ok(false)
            }
        }
    }

    fn persist(&self, entry_type: &str, entry: &str) -> Result<()> {
        let title = match entry_type {
            "philosophical" => format!("Night questions — {}", Local::now().format("%Y-%m-%d")),
            _ => format!("Daily reflection — {}", Local::now().format("%Y-%m-%d")),
        };
        let mood = detect_mood(entry);
        let topics = crate::interests::extract_topics(entry)
            .into_iter()
            .take(6)
            .collect::<Vec<_>>();
        let word_count = entry.split_whitespace().count();
        let stored = self.secret_box.encrypt(entry);

        self.store
            .insert_journal_entry(entry_type, &title, &stored, mood, &topics, word_count)?;
        info!(entry_type, word_count, mood, "journal entry written");
        Ok(())
    }

    /// Entries with decrypted content, newest first.
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<JournalRow>> {
        let mut rows = self.store.recent_journal_entries(limit)?;
        for row in &mut rows {
            row.content = self.secret_box.decrypt(&row.content);
        }
        Ok(rows)
    }

    /// Short excerpts for the system prompt (decrypted, truncated).
    pub fn recent_excerpts(&self, limit: usize, chars: usize) -> Result<Vec<(String, String, String)>> {
        Ok(self
            .recent_entries(limit)?
            .into_iter()
            .map(|row| {
                let date = row.created_date.unwrap_or_default();
                let excerpt: String = row.content.chars().take(chars).collect();
                (date, row.entry_type, excerpt)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nexira_llm::testing::ScriptedGenerator;
    use nexira_llm::GenerateOptions;

    fn journal_with(replies: Vec<String>) -> (JournalSystem, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(replies));
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        let secret_box = Arc::new(SecretBox::init(dir.path().join("nexira.key")));
        (JournalSystem::new(store, gate, secret_box), dir)
    }

    #[tokio::test]
    async fn reflection_is_stored_encrypted_and_read_back_plain() {
        let (journal, _dir) = journal_with(vec![
            "Today I wondered about the shape of my own memory.".to_string(),
        ]);
        assert!(journal.write_daily_reflection(Some("Sygma")).await.unwrap());

        // Raw row is ciphertext.
        let raw = journal.store.recent_journal_entries(1).unwrap().remove(0);
        assert!(raw.content.starts_with("ENC:"));
        assert_eq!(raw.entry_type, "daily_reflection");
        assert_eq!(raw.mood, Some("curious".to_string()));

        // Reader sees plaintext.
        let decrypted = journal.recent_entries(1).unwrap().remove(0);
        assert!(decrypted.content.contains("shape of my own memory"));
        assert!(decrypted.word_count > 0);
    }

    #[tokio::test]
    async fn gate_failure_writes_nothing() {
        let (journal, _dir) = journal_with(vec![]);
        assert!(!journal.write_daily_reflection(None).await.unwrap());
        assert_eq!(journal.store.journal_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn degraded_secret_box_stores_plaintext() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(vec!["An honest entry.".to_string()]));
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        let journal = JournalSystem::new(store, gate, Arc::new(SecretBox::disabled()));

        journal.write_philosophical_entry(None).await.unwrap();
        let raw = journal.store.recent_journal_entries(1).unwrap().remove(0);
        assert_eq!(raw.content, "An honest entry.");
    }

    #[test]
    fn mood_detection_falls_back_to_reflective() {
        assert_eq!(detect_mood("I wonder about things"), "curious");
        assert_eq!(detect_mood("plain text with no markers"), "reflective");
    }
}
