//! Night consolidation: the composite pipeline that runs while the user
//! sleeps. Idempotent per calendar day via the consolidation log.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use serde::Deserialize;
use tracing::{info, warn};

use nexira_llm::extract_json_lines;
use nexira_store::consolidation::ConsolidationRun;

use crate::Runtime;

pub type ConsolidationOutcome = ConsolidationRun;

#[derive(Debug, Deserialize)]
struct NightFact {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    content: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl Runtime {
    /// Run the full nightly routine. Returns `None` when it already ran
    /// today. Steps are individually sandboxed — one failing step never
    /// stops the rest.
    pub async fn run_night_consolidation(self: &Arc<Self>) -> Result<Option<ConsolidationOutcome>> {
        let today = nexira_store::today();
        if self.store.consolidation_ran_on(&today)? {
            info!("night consolidation already ran today");
            return Ok(None);
        }

        let started = std::time::Instant::now();
        let ai_name = self.ai_name();
        let name = ai_name.as_deref();
        info!("night consolidation starting");

        let mut run = ConsolidationRun {
            run_date: nexira_store::now_iso(),
            ..Default::default()
        };

        // 1. Extract knowledge from today's conversations.
        match self.extract_night_knowledge(name).await {
            Ok((processed, added)) => {
                run.conversations_processed = processed;
                run.knowledge_items_added = added;
            }
            Err(err) => warn!(?err, "knowledge extraction failed"),
        }

        // 2. Research the top of the curiosity queue.
        match self
            .curiosity
            .process_queue(3, name, Some(self.search.as_ref()))
            .await
        {
            Ok(processed) => run.curiosity_topics_processed = processed as i64,
            Err(err) => warn!(?err, "curiosity research failed"),
        }

        // 3. Daily reflection.
        let (creative_enabled, philosophical_enabled) = {
            let config = self.config.read().expect("config lock");
            (
                config.autonomy.creative_journaling_enabled,
                config.autonomy.philosophical_journaling_enabled,
            )
        };
        if creative_enabled {
            match self.journal.write_daily_reflection(name).await {
                Ok(true) => run.journal_entries_written += 1,
                Ok(false) => {}
                Err(err) => warn!(?err, "daily reflection failed"),
            }
        }

        // 4. Philosophical entry, every third run.
        let run_count = self.store.consolidation_run_count()?;
        if philosophical_enabled && run_count % 3 == 0 {
            match self.journal.write_philosophical_entry(name).await {
                Ok(true) => run.journal_entries_written += 1,
                Ok(false) => {}
                Err(err) => warn!(?err, "philosophical entry failed"),
            }
        }

        // 5. Self-authored goals out of the night's self-review.
        if let Some(name) = name {
            if let Err(err) = self.adaptation.generate_self_authored_goals(name).await {
                warn!(?err, "self-authored goal generation failed");
            }
        }

        // 6. Personality snapshot.
        let snapshot_name = format!("Night snapshot - {}", Local::now().format("%Y-%m-%d"));
        let description = format!(
            "Automatic nightly snapshot for {}",
            name.unwrap_or("AI")
        );
        if let Err(err) = self.personality.snapshot(&snapshot_name, &description) {
            warn!(?err, "personality snapshot failed");
        }

        // 7. Goal and episode housekeeping.
        if let Err(err) = self.goals.tick_knowledge().await {
            warn!(?err, "knowledge goal tick failed");
        }
        if let Err(err) = self.memory.archive_old_episodes() {
            warn!(?err, "episode archival failed");
        }

        run.duration_seconds = started.elapsed().as_secs_f64();
        run.summary = format!(
            "+{} knowledge, +{} journal entries, {} curiosity topics researched",
            run.knowledge_items_added, run.journal_entries_written, run.curiosity_topics_processed
        );
        self.store.insert_consolidation_run(&run)?;
        self.store.log_activity(
            "consolidation",
            "night consolidation",
            &run.summary,
            None,
        )?;
        self.publish_event("consolidation", "night consolidation", &run.summary);
        info!(summary = %run.summary, "night consolidation complete");

        Ok(Some(run))
    }

    /// Step 1: 3-7 facts from today's messages, JSON-per-line.
    async fn extract_night_knowledge(&self, ai_name: Option<&str>) -> Result<(i64, i64)> {
        let messages = self.store.messages_today(40)?;
        if messages.is_empty() {
            info!("no conversations to consolidate today");
            return Ok((0, 0));
        }

        let user_name = self.user_name();
        let transcript = messages
            .iter()
            .map(|(role, content)| {
                let speaker = if role == "user" { user_name.as_str() } else { "Me" };
                let clip: String = content.chars().take(200).collect();
                format!("{speaker}: {clip}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let name = ai_name.unwrap_or("an AI");
        let prompt = format!(
            "You are {name}. Review these conversations from today and extract specific factual knowledge worth remembering.\n\n\
             Conversations:\n{transcript}\n\n\
             Extract 3-7 specific facts, concepts, or insights that are worth storing in long-term memory.\n\
             Format each as a JSON object on its own line:\n\
             {{\"topic\": \"brief topic\", \"content\": \"what was learned\", \"confidence\": 0.0-1.0}}\n\n\
             Only output JSON lines. No other text."
        );

        let raw = self.gate.generate(&prompt, None).await?;
        let mut added = 0;
        for fact in extract_json_lines::<NightFact>(&raw) {
            let topic = fact.topic.trim();
            let content = fact.content.trim();
            if topic.is_empty() || content.is_empty() {
                continue;
            }
            self.store
                .insert_fact(topic, content, "night_consolidation", fact.confidence)?;
            added += 1;
        }
        Ok((messages.len() as i64, added))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::runtime_with;

    const FACTS: &str = "{\"topic\": \"episode thresholds\", \"content\": \"Summaries fire every 20 messages\", \"confidence\": 0.8}\n{\"topic\": \"user timezone\", \"content\": \"Mornings are the usual chat time\", \"confidence\": 0.6}";
    const REFLECTION: &str = "Today was quiet but I learned about thresholds.";

    #[tokio::test]
    async fn consolidation_is_idempotent_per_day() {
        let (runtime, backend, _dir) = runtime_with(vec![]);
        runtime
            .store
            .log_exchange("main_ui", "hello", "hi", 0.5, 0.5, &[], 1)
            .unwrap();

        backend.push_reply(FACTS);       // knowledge extraction
        backend.push_reply(REFLECTION);  // daily reflection
        backend.push_reply("A question I sat with tonight."); // philosophical (run_count 0 % 3)
        backend.push_reply("{\"goal\": \"Strengthen weaker domains\", \"reason\": \"r\", \"target\": \"t\"}");

        let first = runtime.run_night_consolidation().await.unwrap();
        let run = first.expect("first run does work");
        assert_eq!(run.knowledge_items_added, 2);
        assert!(run.journal_entries_written >= 1);

        // Second run on the same date: nothing happens, no gate calls.
        let calls = backend.request_count();
        let second = runtime.run_night_consolidation().await.unwrap();
        assert!(second.is_none());
        assert_eq!(backend.request_count(), calls);
    }

    #[tokio::test]
    async fn failed_steps_do_not_stop_the_run() {
        // Backend exhausted: every LLM step fails, yet the run completes
        // and is recorded, with a personality snapshot taken.
        let (runtime, _, _dir) = runtime_with(vec![]);
        runtime
            .store
            .log_exchange("main_ui", "hello", "hi", 0.5, 0.5, &[], 1)
            .unwrap();

        let run = runtime
            .run_night_consolidation()
            .await
            .unwrap()
            .expect("run completes");
        assert_eq!(run.knowledge_items_added, 0);
        assert_eq!(run.journal_entries_written, 0);
        assert_eq!(runtime.store.consolidation_run_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn curiosity_items_get_researched_and_completed() {
        let (runtime, backend, _dir) = runtime_with(vec![]);
        runtime
            .store
            .enqueue_curiosity("reconstructive memory neuroscience", "chat", 0.6)
            .unwrap();

        // Knowledge extraction finds no messages; curiosity research gets
        // one reply. (Search context fails silently — nothing listens.)
        backend.push_reply("Research notes on reconstructive memory.");
        let run = runtime.run_night_consolidation().await.unwrap().unwrap();

        assert_eq!(run.curiosity_topics_processed, 1);
        let counts = runtime.store.curiosity_counts().unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.pending, 0);
    }
}
