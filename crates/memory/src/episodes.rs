//! Rolling episode summarization.
//!
//! After every logged exchange the conversation core calls
//! [`MemoryEngine::check_and_summarize`]. When enough new raw messages
//! have accumulated past the last covered id, a background task summarizes
//! the new range. The caller never waits; a summarization failure is
//! logged and dropped — the next threshold crossing covers the same range
//! again because range selection derives from `max(range_end)`, not from
//! attempt history.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info, warn};

use crate::{MemoryEngine, iso_week};

/// Keywords that mark an episode as higher-importance.
const HIGH_IMPORTANCE_WORDS: [&str; 8] = [
    "important", "decided", "remember", "agreed", "critical", "milestone", "named", "chose",
];

/// Split a summarizer response into (summary, topics). The model is asked
/// for free text followed by a `TOPICS:` line; anything else on that line
/// pattern is tolerated.
pub fn parse_summary_response(raw: &str) -> (String, Vec<String>) {
    let mut topics_line = String::new();
    let mut summary_lines = Vec::new();

    for line in raw.lines() {
        if line.to_uppercase().starts_with("TOPICS:") {
            if let Some((_, rest)) = line.split_once(':') {
                topics_line = rest.trim().to_string();
            }
        } else {
            summary_lines.push(line);
        }
    }

    let summary = summary_lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    let topics = topics_line
        .split(',')
        .map(|topic| topic.trim().to_string())
        .filter(|topic| !topic.is_empty())
        .collect();

    (summary, topics)
}

/// 0.5 base, raised to 0.8 when the summary carries a decision/commitment
/// keyword.
pub fn estimate_importance(summary: &str) -> f64 {
    let lower = summary.to_lowercase();
    if HIGH_IMPORTANCE_WORDS.iter().any(|word| lower.contains(word)) {
        0.8
    } else {
        0.5
    }
}

impl MemoryEngine {
    /// Fire-and-forget trigger. Returns true when a summarization task was
    /// spawned (used by tests and the stats endpoint, not by callers on the
    /// request path).
    pub fn check_and_summarize(self: &Arc<Self>, ai_name: Option<String>) -> bool {
        let episodic = &self.config().episodic;
        if !episodic.enabled || !episodic.background_summarization {
            return false;
        }

        let threshold = episodic.summarize_every_n_messages;
        let last_covered = match self.store().max_episode_range_end() {
            Ok(id) => id,
            Err(err) => {
                warn!(?err, "summarize trigger: range check failed");
                return false;
            }
        };
        let pending = match self.store().messages_after(last_covered) {
            Ok((count, _, _)) => count,
            Err(err) => {
                warn!(?err, "summarize trigger: count failed");
                return false;
            }
        };

        if pending < threshold {
            return false;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = engine.summarize_pending(ai_name.as_deref()).await {
                warn!(?err, "episode summarization failed");
            }
        });
        true
    }

    /// Summarize the oldest uncovered range, if it still meets the
    /// threshold. Serialized on the summarizer mutex; the range is
    /// re-derived under the lock so two concurrent triggers cannot both
    /// cover the same ids.
    pub async fn summarize_pending(&self, ai_name: Option<&str>) -> Result<bool> {
        let _guard = self.summarize_lock().lock().await;

        let threshold = self.config().episodic.summarize_every_n_messages;
        let last_covered = self.store().max_episode_range_end()?;
        let (count, min_id, max_id) = self.store().messages_after(last_covered)?;
        let (Some(from_id), Some(to_id)) = (min_id, max_id) else {
            return Ok(false);
        };
        if count < threshold {
            debug!(count, threshold, "summarize: threshold no longer met");
            return Ok(false);
        }

        let rows = self.store().messages_in_range(from_id, to_id)?;
        if rows.is_empty() {
            return Ok(false);
        }

        let name = ai_name.unwrap_or("AI");
        let user_name = self.user_name().to_string();
        let transcript = rows
            .iter()
            .map(|(role, content)| {
                let speaker = if role == "user" { user_name.as_str() } else { name };
                let snippet: String = content.chars().take(300).collect();
                format!("{speaker}: {snippet}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Summarize this conversation segment between {user_name} and {name}.\n\n\
             Conversation:\n{transcript}\n\n\
             Write a 3-5 sentence summary that captures:\n\
             - The main topics discussed\n\
             - Any decisions made or conclusions reached\n\
             - Key facts shared (names, numbers, technical details)\n\
             - The emotional tone if notable\n\n\
             Then on a new line write:\n\
             TOPICS: comma-separated list of 3-8 key topics from this segment\n\n\
             Be specific. Avoid vague phrases like \"they discussed things\".\n\
             Output the summary first, then the TOPICS line. Nothing else."
        );

        let raw = self.gate().generate(&prompt, None).await?;
        let (summary, topics) = parse_summary_response(&raw);
        if summary.is_empty() {
            warn!(from_id, to_id, "summarize: model returned no summary text");
            return Ok(false);
        }

        let importance = estimate_importance(&summary);
        self.store().insert_episode(
            iso_week(Local::now()),
            from_id,
            to_id,
            &summary,
            &topics,
            importance,
        )?;
        info!(
            from_id,
            to_id,
            topics = topics.len(),
            importance,
            "episode summary stored"
        );
        Ok(true)
    }

    /// Archive episodes older than the retention window. Nightly.
    pub fn archive_old_episodes(&self) -> Result<usize> {
        let retention = self.config().episodic.retention_days;
        let cutoff = (Local::now() - chrono::Duration::days(retention))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let archived = self.store().archive_episodes_before(&cutoff)?;
        if archived > 0 {
            info!(archived, "archived old episodes");
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nexira_llm::testing::ScriptedGenerator;
    use nexira_llm::{GenerateOptions, LlmGate};
    use nexira_store::Store;

    fn engine_with_replies(replies: Vec<String>) -> (Arc<MemoryEngine>, Arc<ScriptedGenerator>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(replies));
        let gate = LlmGate::new(backend.clone(), "qwen3:8b", GenerateOptions::default());
        let engine = Arc::new(MemoryEngine::new(
            store,
            gate,
            nexira_config::MemoryConfig::default(),
            "Xeeker".to_string(),
        ));
        (engine, backend)
    }

    fn seed_exchanges(engine: &MemoryEngine, n: usize) {
        for i in 0..n {
            engine
                .store()
                .log_exchange("main_ui", &format!("q{i}"), &format!("a{i}"), 0.5, 0.5, &[], 1)
                .unwrap();
        }
    }

    const SUMMARY_REPLY: &str =
        "We worked through memory system design and agreed on a threshold.\nTOPICS: memory design, thresholds, rust";

    #[test]
    fn parse_splits_summary_and_topics() {
        let (summary, topics) = parse_summary_response(SUMMARY_REPLY);
        assert!(summary.starts_with("We worked"));
        assert_eq!(topics, vec!["memory design", "thresholds", "rust"]);
    }

    #[test]
    fn parse_tolerates_missing_topics_line() {
        let (summary, topics) = parse_summary_response("Just a summary, nothing else.");
        assert!(!summary.is_empty());
        assert!(topics.is_empty());
    }

    #[test]
    fn importance_rises_on_decision_words() {
        assert_eq!(estimate_importance("we decided on the plan"), 0.8);
        assert_eq!(estimate_importance("casual chatting"), 0.5);
    }

    #[tokio::test]
    async fn threshold_exactly_n_fires_n_minus_one_does_not() {
        let (engine, _) = engine_with_replies(vec![SUMMARY_REPLY.to_string()]);
        // 19 messages: below the 20-message threshold.
        engine
            .store()
            .log_system_message("seed", 1)
            .unwrap();
        seed_exchanges(&engine, 9); // 1 + 18 = 19
        assert!(!engine.summarize_pending(Some("Sygma")).await.unwrap());

        // One more message crosses the threshold of 20.
        engine.store().log_system_message("the 20th", 1).unwrap();
        assert!(engine.summarize_pending(Some("Sygma")).await.unwrap());

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_episodes, 1);
        assert_eq!(engine.store().max_episode_range_end().unwrap(), 20);
    }

    #[tokio::test]
    async fn second_pass_needs_another_full_window() {
        let (engine, backend) = engine_with_replies(vec![SUMMARY_REPLY.to_string()]);
        seed_exchanges(&engine, 10);
        assert!(engine.summarize_pending(None).await.unwrap());

        // Ten more raw messages: only half a window past id 20.
        backend.push_reply(SUMMARY_REPLY);
        seed_exchanges(&engine, 5);
        assert!(!engine.summarize_pending(None).await.unwrap());

        seed_exchanges(&engine, 5);
        assert!(engine.summarize_pending(None).await.unwrap());
        assert_eq!(engine.store().max_episode_range_end().unwrap(), 40);
    }

    #[tokio::test]
    async fn failed_summarization_leaves_range_uncovered() {
        let (engine, backend) = engine_with_replies(vec![]);
        seed_exchanges(&engine, 10);
        assert!(engine.summarize_pending(None).await.is_err());
        assert_eq!(engine.store().max_episode_range_end().unwrap(), 0);

        // Next attempt covers the same ids.
        backend.push_reply(SUMMARY_REPLY);
        assert!(engine.summarize_pending(None).await.unwrap());
        assert_eq!(engine.store().max_episode_range_end().unwrap(), 20);
    }

    #[tokio::test]
    async fn transcript_truncates_long_messages() {
        let (engine, backend) = engine_with_replies(vec![SUMMARY_REPLY.to_string()]);
        let long = "x".repeat(2000);
        for _ in 0..10 {
            engine
                .store()
                .log_exchange("main_ui", &long, "short", 0.5, 0.5, &[], 1)
                .unwrap();
        }
        engine.summarize_pending(None).await.unwrap();

        let request = &backend.requests()[0];
        // Each message contributes at most 300 chars to the transcript.
        assert!(!request.prompt.contains(&"x".repeat(301)));
        assert!(request.prompt.contains(&"x".repeat(300)));
    }
}
