//! Weekly synthesis: the once-per-ISO-week rollup of uncommitted episodes
//! into long-term knowledge.
//!
//! Two gate calls: one writes the synthesis narrative plus a CORRECTIONS
//! line, one extracts knowledge facts (JSON-per-line) from the episodes
//! that intersect confirmed topics. Every processed episode is then marked
//! committed and archived, which is what makes a re-run in the same week
//! a no-op even before the iso-week guard is consulted.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use serde::Deserialize;
use tracing::{info, warn};

use nexira_llm::extract_json_lines;
use nexira_store::episodes::EpisodeRow;

use crate::{MemoryEngine, iso_week};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WeeklyOutcome {
    pub episodes_processed: usize,
    pub confirmed_topics: usize,
    pub tentative_topics: usize,
    pub knowledge_items_added: i64,
    pub duration_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct FactCandidate {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    content: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.6
}

/// Count how often each lowercased topic appears across episode topic
/// lists. The confirmed/tentative split falls out of the counts.
pub fn topic_frequency(episodes: &[EpisodeRow]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for episode in episodes {
        for topic in &episode.topics {
            let key = topic.to_lowercase().trim().to_string();
            if !key.is_empty() {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Split the synthesis response into (synthesis text, corrections list).
/// `CORRECTIONS: NONE` yields an empty list.
pub fn parse_synthesis_response(raw: &str) -> (String, Vec<String>) {
    let mut corrections = Vec::new();
    let mut synthesis_lines = Vec::new();

    for line in raw.lines() {
        if line.to_uppercase().starts_with("CORRECTIONS:") {
            if let Some((_, rest)) = line.split_once(':') {
                let rest = rest.trim();
                if !rest.eq_ignore_ascii_case("none") {
                    corrections = rest
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect();
                }
            }
        } else {
            synthesis_lines.push(line);
        }
    }

    let synthesis = synthesis_lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    (synthesis, corrections)
}

impl MemoryEngine {
    /// Whether synthesis still needs to run for the week containing `now`.
    pub fn should_run_weekly(&self, now: DateTime<Local>) -> Result<bool> {
        if !self.config().weekly_consolidation.enabled {
            return Ok(false);
        }
        Ok(!self.store().weekly_synthesis_exists(iso_week(now))?)
    }

    /// The full weekly pipeline. Returns `None` when there is nothing to do
    /// (already ran this week, or no uncommitted episodes in the window).
    pub async fn run_weekly_synthesis(
        &self,
        ai_name: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<Option<WeeklyOutcome>> {
        if !self.should_run_weekly(now)? {
            info!("weekly synthesis already ran this week");
            return Ok(None);
        }

        let started = std::time::Instant::now();
        let week = iso_week(now);
        let week_ago = (now - Duration::days(7))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let episodes = self.store().uncommitted_episodes_since(&week_ago)?;
        if episodes.is_empty() {
            info!("weekly synthesis: no uncommitted episodes");
            return Ok(None);
        }

        info!(episodes = episodes.len(), week, "weekly synthesis starting");

        let counts = topic_frequency(&episodes);
        let min_confirm = self.config().weekly_consolidation.min_confirmations_for_longterm;
        let mut confirmed: Vec<(String, u32)> = counts
            .iter()
            .filter(|(_, count)| **count >= min_confirm)
            .map(|(topic, count)| (topic.clone(), *count))
            .collect();
        confirmed.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let tentative: Vec<String> = counts
            .iter()
            .filter(|(_, count)| **count < min_confirm)
            .map(|(topic, _)| topic.clone())
            .collect();

        let episode_text = episodes
            .iter()
            .map(|episode| {
                let stamp: String = episode.created_at.chars().take(16).collect();
                format!("[{stamp}] {}", episode.summary)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let (synthesis, corrections) = self
            .generate_synthesis(&episode_text, ai_name, &confirmed)
            .await;

        let items_added = self
            .commit_knowledge(&episodes, &confirmed, week, ai_name)
            .await?;

        let week_start = (now - Duration::days(7)).format("%Y-%m-%d").to_string();
        let week_end = now.format("%Y-%m-%d").to_string();
        let confirmed_names: Vec<String> = confirmed.iter().map(|(t, _)| t.clone()).collect();

        self.store().insert_weekly_synthesis(
            &week_start,
            &week_end,
            week,
            &synthesis,
            &confirmed_names,
            &tentative,
            &corrections,
            items_added,
        )?;

        let ids: Vec<i64> = episodes.iter().map(|e| e.id).collect();
        self.store().commit_and_archive_episodes(&ids)?;

        let outcome = WeeklyOutcome {
            episodes_processed: episodes.len(),
            confirmed_topics: confirmed.len(),
            tentative_topics: tentative.len(),
            knowledge_items_added: items_added,
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        info!(?outcome, "weekly synthesis complete");
        Ok(Some(outcome))
    }

    /// First gate call: the narrative synthesis. A gate failure degrades to
    /// a placeholder — the commit pass and bookkeeping still run.
    async fn generate_synthesis(
        &self,
        episode_text: &str,
        ai_name: Option<&str>,
        confirmed: &[(String, u32)],
    ) -> (String, Vec<String>) {
        let name = ai_name.unwrap_or("AI");
        let user_name = self.user_name();
        let episode_clip: String = episode_text.chars().take(6000).collect();
        let confirmed_list = confirmed
            .iter()
            .take(20)
            .map(|(topic, _)| topic.clone())
            .collect::<Vec<_>>()
            .join(", ");

        let prompt = format!(
            "You are {name}. Review this week's conversation summaries and write a weekly synthesis.\n\n\
             EPISODE SUMMARIES FROM THIS WEEK:\n{episode_clip}\n\n\
             MOST DISCUSSED TOPICS: {confirmed_list}\n\n\
             Write a cohesive weekly synthesis (5-8 sentences) covering:\n\
             - What were the major themes and developments this week?\n\
             - What important decisions or conclusions were reached?\n\
             - What did you learn about {user_name} or the project?\n\
             - Are there any apparent corrections — things that were stated one way\n  \
               early in the week but revised or contradicted later?\n\n\
             After the synthesis, on a new line write:\n\
             CORRECTIONS: comma-separated list of any topics where earlier statements\n\
             were revised or contradicted this week. Write NONE if there are none.\n\n\
             Output only the synthesis and the CORRECTIONS line."
        );

        match self.gate().generate(&prompt, None).await {
            Ok(raw) => parse_synthesis_response(&raw),
            Err(err) => {
                warn!(?err, "weekly synthesis generation failed");
                (format!("Weekly synthesis (generation unavailable) — {} topics confirmed", confirmed.len()), Vec::new())
            }
        }
    }

    /// Second gate call: fact extraction over episodes that intersect
    /// confirmed topics, committed via UPSERT. Returns new-row count.
    async fn commit_knowledge(
        &self,
        episodes: &[EpisodeRow],
        confirmed: &[(String, u32)],
        week: i64,
        ai_name: Option<&str>,
    ) -> Result<i64> {
        if confirmed.is_empty() {
            return Ok(0);
        }

        let relevant: Vec<&EpisodeRow> = episodes
            .iter()
            .filter(|episode| {
                let lower: Vec<String> =
                    episode.topics.iter().map(|t| t.to_lowercase()).collect();
                confirmed.iter().any(|(topic, _)| lower.contains(topic))
            })
            .collect();
        if relevant.is_empty() {
            return Ok(0);
        }

        let name = ai_name.unwrap_or("AI");
        let episode_text: String = relevant
            .iter()
            .take(10)
            .map(|episode| {
                let stamp: String = episode.created_at.chars().take(16).collect();
                format!("[{stamp}] {}", episode.summary)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
            .chars()
            .take(5000)
            .collect();
        let confirmed_list = confirmed
            .iter()
            .take(15)
            .map(|(topic, count)| format!("{topic} ({count}x)"))
            .collect::<Vec<_>>()
            .join(", ");

        let prompt = format!(
            "You are {name}. Extract specific, factual knowledge from these episode summaries for long-term memory storage.\n\n\
             EPISODES:\n{episode_text}\n\n\
             CONFIRMED TOPICS (seen multiple times this week): {confirmed_list}\n\n\
             Extract 4-10 specific facts worth storing permanently. Focus on confirmed topics.\n\n\
             Each fact must be:\n\
             - Specific and named (not vague)\n\
             - At least 5 words as a topic\n\
             - Genuinely useful for future conversations\n\n\
             Format each as a JSON object on its own line:\n\
             {{\"topic\": \"specific topic name\", \"content\": \"the actual fact to remember\", \"confidence\": 0.8}}\n\n\
             Only output JSON lines. No other text."
        );

        let raw = match self.gate().generate(&prompt, None).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "weekly knowledge extraction failed");
                return Ok(0);
            }
        };

        let weekly = &self.config().weekly_consolidation;
        let mut added = 0;
        for candidate in extract_json_lines::<FactCandidate>(&raw) {
            let topic = candidate.topic.trim().to_string();
            let content = candidate.content.trim().to_string();

            // Quality filter: short or vague candidates never reach the
            // knowledge base.
            if topic.split_whitespace().count() < 3 || topic.len() < 12 || content.len() < 25 {
                continue;
            }

            // Mention count floors the confidence.
            let mut confidence = candidate.confidence;
            let topic_lower = topic.to_lowercase();
            for (confirmed_topic, count) in confirmed {
                if topic_lower.contains(confirmed_topic.as_str()) {
                    confidence = if *count >= 3 {
                        confidence.max(weekly.confidence_three_plus)
                    } else {
                        confidence.max(weekly.confidence_twice)
                    };
                    break;
                }
            }

            if self
                .store()
                .upsert_confirmed_fact(&topic, &content, confidence, week)?
            {
                added += 1;
            }
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nexira_llm::testing::ScriptedGenerator;
    use nexira_llm::{GenerateOptions, LlmGate};
    use nexira_store::Store;

    fn engine_with(replies: Vec<String>) -> (MemoryEngine, Arc<ScriptedGenerator>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(replies));
        let gate = LlmGate::new(backend.clone(), "qwen3:8b", GenerateOptions::default());
        (
            MemoryEngine::new(
                store,
                gate,
                nexira_config::MemoryConfig::default(),
                "Xeeker".to_string(),
            ),
            backend,
        )
    }

    fn seed_episode(engine: &MemoryEngine, range: (i64, i64), topics: &[&str]) {
        engine
            .store()
            .insert_episode(
                30,
                range.0,
                range.1,
                "we discussed the memory system design at some length",
                &topics.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                0.5,
            )
            .unwrap();
    }

    const SYNTH_REPLY: &str =
        "The week centred on memory design.\nWe confirmed the episode threshold.\nCORRECTIONS: NONE";
    const FACTS_REPLY: &str = "{\"topic\": \"memory system episode threshold\", \"content\": \"Episodes summarize every twenty raw messages into one record.\", \"confidence\": 0.7}";

    #[test]
    fn frequency_counts_lowercased_topics() {
        let (engine, _) = engine_with(vec![]);
        seed_episode(&engine, (1, 20), &["Memory Design", "rust"]);
        seed_episode(&engine, (21, 40), &["memory design"]);
        let episodes = engine.store().uncommitted_episodes_since("2000").unwrap();
        let counts = topic_frequency(&episodes);
        assert_eq!(counts["memory design"], 2);
        assert_eq!(counts["rust"], 1);
    }

    #[test]
    fn corrections_line_none_is_empty() {
        let (synthesis, corrections) = parse_synthesis_response(SYNTH_REPLY);
        assert!(synthesis.contains("memory design"));
        assert!(corrections.is_empty());

        let (_, corrections) =
            parse_synthesis_response("text\nCORRECTIONS: project deadline, database choice");
        assert_eq!(corrections, vec!["project deadline", "database choice"]);
    }

    #[tokio::test]
    async fn synthesis_runs_once_per_week() {
        let (engine, backend) = engine_with(vec![SYNTH_REPLY.to_string(), FACTS_REPLY.to_string()]);
        seed_episode(&engine, (1, 20), &["memory design"]);
        seed_episode(&engine, (21, 40), &["memory design"]);

        let now = Local::now();
        let first = engine.run_weekly_synthesis(Some("Sygma"), now).await.unwrap();
        let outcome = first.expect("first run does work");
        assert_eq!(outcome.episodes_processed, 2);
        assert_eq!(outcome.confirmed_topics, 1);
        assert_eq!(outcome.knowledge_items_added, 1);

        // Second run in the same ISO week: no work, no extra gate calls.
        backend.push_reply(SYNTH_REPLY);
        let calls_before = backend.request_count();
        let second = engine.run_weekly_synthesis(Some("Sygma"), now).await.unwrap();
        assert!(second.is_none());
        assert_eq!(backend.request_count(), calls_before);
    }

    #[tokio::test]
    async fn processed_episodes_are_committed_and_archived() {
        let (engine, _) = engine_with(vec![SYNTH_REPLY.to_string(), FACTS_REPLY.to_string()]);
        seed_episode(&engine, (1, 20), &["memory design"]);
        seed_episode(&engine, (21, 40), &["memory design"]);

        engine
            .run_weekly_synthesis(None, Local::now())
            .await
            .unwrap();

        assert!(engine
            .store()
            .uncommitted_episodes_since("2000")
            .unwrap()
            .is_empty());
        let stats = engine.stats().unwrap();
        assert_eq!(stats.active_episodes, 0);
    }

    #[tokio::test]
    async fn committed_facts_respect_confidence_floor() {
        let low_confidence_fact = "{\"topic\": \"memory design threshold fact\", \"content\": \"A fact stated with low model confidence but high confirmation.\", \"confidence\": 0.3}";
        let (engine, _) = engine_with(vec![
            SYNTH_REPLY.to_string(),
            low_confidence_fact.to_string(),
        ]);
        // Three confirmations pushes the floor to 0.85.
        seed_episode(&engine, (1, 20), &["memory design"]);
        seed_episode(&engine, (21, 40), &["memory design"]);
        seed_episode(&engine, (41, 60), &["memory design"]);

        engine
            .run_weekly_synthesis(None, Local::now())
            .await
            .unwrap();

        let fact = engine
            .store()
            .fact_by_topic("memory design threshold fact")
            .unwrap()
            .unwrap();
        assert!((fact.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn quality_filter_drops_vague_candidates() {
        let junk = "{\"topic\": \"vague\", \"content\": \"too short\", \"confidence\": 0.9}";
        let (engine, _) = engine_with(vec![SYNTH_REPLY.to_string(), junk.to_string()]);
        seed_episode(&engine, (1, 20), &["memory design"]);
        seed_episode(&engine, (21, 40), &["memory design"]);

        let outcome = engine
            .run_weekly_synthesis(None, Local::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.knowledge_items_added, 0);
    }

    #[tokio::test]
    async fn no_uncommitted_episodes_means_no_synthesis_row() {
        let (engine, _) = engine_with(vec![]);
        let outcome = engine
            .run_weekly_synthesis(None, Local::now())
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(engine.should_run_weekly(Local::now()).unwrap());
    }
}
