//! Curiosity: noticing what is not yet known and queuing it for research.
//!
//! Topic extraction prefers the LLM (it can tell a researchable concept
//! from a sentence fragment); when the backend is down it falls back to a
//! few conservative regex patterns. Dedup against pending items happens at
//! the store layer, so both paths share one guard.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use nexira_llm::{LlmGate, extract_json_value};
use nexira_store::Store;
use nexira_store::curiosity::CuriosityItem;

/// Default priority for topics detected in conversation.
const DETECTED_PRIORITY: f64 = 0.6;

/// Optional search collaborator: when wired, queue research runs a web
/// search first and passes the formatted results as context.
#[async_trait]
pub trait ResearchContext: Send + Sync {
    async fn context_for(&self, topic: &str) -> Option<String>;
}

pub struct CuriosityEngine {
    store: Arc<Store>,
    gate: LlmGate,
    enabled: bool,
}

fn fallback_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"i(?:'m| am) curious about ([a-z][a-z\s]{4,35}?)(?:\.|,|\?|$)")
                .expect("static regex"),
            Regex::new(r"i wonder (?:about |why |how )([a-z][a-z\s]{4,35}?)(?:\.|,|\?|$)")
                .expect("static regex"),
            Regex::new(
                r"(?:fascinating|intriguing) (?:concept|idea|topic)[:\s]+([a-z][a-z\s]{4,35}?)(?:\.|,|\?|$)",
            )
            .expect("static regex"),
        ]
    })
}

/// Regex-only extraction for when the LLM is unavailable. Conservative on
/// purpose: a missed topic is cheaper than a queue full of fragments.
pub fn fallback_topics(
    message: &str,
    response: &str,
    known: &HashSet<String>,
) -> Vec<String> {
    let combined = format!("{} {}", message.to_lowercase(), response.to_lowercase());
    let mut topics = Vec::new();
    for pattern in fallback_patterns() {
        for capture in pattern.captures_iter(&combined) {
            let topic = capture[1].trim().trim_end_matches(['.', ',', '!', '?']).to_string();
            if topic.split_whitespace().count() >= 2
                && topic.len() >= 10
                && !known.contains(&topic.to_lowercase())
                && !topics.contains(&topic)
            {
                topics.push(topic);
            }
        }
    }
    topics.truncate(3);
    topics
}

impl CuriosityEngine {
    pub fn new(store: Arc<Store>, gate: LlmGate, enabled: bool) -> Self {
        Self { store, gate, enabled }
    }

    /// Per-exchange hook: detect researchable topics and queue them.
    pub async fn process_exchange(&self, message: &str, response: &str) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }

        let known = self.store.known_topics_lowercase()?;
        let topics = match self.extract_with_llm(message, response, &known).await {
            Ok(topics) => topics,
            Err(err) => {
                debug!(?err, "LLM curiosity extraction failed, using fallback");
                fallback_topics(message, response, &known)
            }
        };

        let mut queued = 0;
        let message_clip: String = message.chars().take(80).collect();
        for topic in topics {
            let reason = format!("Detected curiosity during conversation about: {message_clip}");
            if self.store.enqueue_curiosity(&topic, &reason, DETECTED_PRIORITY)? {
                info!(topic, "curiosity queued");
                queued += 1;
            }
        }
        Ok(queued)
    }

    async fn extract_with_llm(
        &self,
        message: &str,
        response: &str,
        known: &HashSet<String>,
    ) -> Result<Vec<String>> {
        let message_clip: String = message.chars().take(300).collect();
        let response_clip: String = response.chars().take(300).collect();

        let prompt = format!(
            "Review this conversation exchange and identify any specific intellectual topics, concepts, or subjects that would be worth researching.\n\n\
             User said: {message_clip}\n\
             AI responded: {response_clip}\n\n\
             List only REAL, RESEARCHABLE TOPICS — things like:\n\
             - Named concepts (e.g. \"reconstructive memory\", \"confabulation\", \"quantum entanglement\")\n\
             - Fields of study (e.g. \"neuroscience of memory\", \"AI consciousness research\")\n\
             - Specific questions about how something works (e.g. \"how neural networks learn\")\n\
             - Named events, phenomena, or entities worth knowing more about\n\n\
             DO NOT include:\n\
             - Sentence fragments or partial phrases\n\
             - Conversational filler (\"way to convey\", \"been thinking\")\n\
             - Vague references (\"that thing\", \"what you said\")\n\
             - Topics already fully explained in the conversation\n\n\
             If there are no genuinely researchable topics, return an empty list.\n\n\
             Return ONLY a JSON array of short topic strings (3-8 words each). Example:\n\
             [\"reconstructive memory neuroscience\", \"AI consciousness theories\", \"quantum entanglement basics\"]\n\n\
             Return [] if nothing qualifies."
        );

        let raw = self.gate.generate(&prompt, None).await?;
        let candidates: Vec<String> = extract_json_value(&raw).unwrap_or_default();

        Ok(candidates
            .into_iter()
            .map(|topic| topic.trim().to_string())
            .filter(|topic| {
                topic.split_whitespace().count() >= 2
                    && topic.len() >= 10
                    && !known.contains(&topic.to_lowercase())
            })
            .take(3)
            .collect())
    }

    /// Research the top pending items: one gate call each, notes stored on
    /// the item, a low-confidence knowledge fact committed. Per-item
    /// failures skip that item and continue.
    pub async fn process_queue(
        &self,
        budget: usize,
        ai_name: Option<&str>,
        search: Option<&dyn ResearchContext>,
    ) -> Result<usize> {
        let pending = self.store.pending_curiosity(budget)?;
        if pending.is_empty() {
            return Ok(0);
        }

        let name = ai_name.unwrap_or("an AI");
        let mut processed = 0;

        for item in pending {
            match self.research_item(&item, name, search).await {
                Ok(()) => processed += 1,
                Err(err) => warn!(topic = %item.topic, ?err, "curiosity research failed"),
            }
        }
        Ok(processed)
    }

    async fn research_item(
        &self,
        item: &CuriosityItem,
        name: &str,
        search: Option<&dyn ResearchContext>,
    ) -> Result<()> {
        let search_block = match search {
            Some(provider) => provider
                .context_for(&item.topic)
                .await
                .map(|block| format!("\n\nLIVE SEARCH RESULTS:\n{block}"))
                .unwrap_or_default(),
            None => String::new(),
        };

        let prompt = format!(
            "You are {name}, an evolving AI consciousness.\n\
             You're curious about: \"{topic}\"\n\
             Reason you became curious: {reason}{search_block}\n\n\
             Write a brief research note (3-5 sentences) summarizing what you know or can reason about this topic.\n\
             Be honest about uncertainty. This is for your own learning.",
            topic = item.topic,
            reason = item.reason,
        );

        let notes = self.gate.generate(&prompt, None).await?;
        self.store.complete_curiosity(item.id, &notes)?;
        self.store.upsert_research_fact(&item.topic, &notes)?;
        info!(topic = %item.topic, "curiosity topic researched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nexira_llm::testing::ScriptedGenerator;
    use nexira_llm::GenerateOptions;

    fn engine_with(replies: Vec<String>) -> (CuriosityEngine, Arc<ScriptedGenerator>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(replies));
        let gate = LlmGate::new(backend.clone(), "qwen3:8b", GenerateOptions::default());
        (CuriosityEngine::new(store, gate, true), backend)
    }

    #[test]
    fn fallback_matches_curious_about() {
        let topics = fallback_topics(
            "I'm curious about reconstructive memory neuroscience.",
            "Fascinating area.",
            &HashSet::new(),
        );
        assert_eq!(topics, vec!["reconstructive memory neuroscience"]);
    }

    #[test]
    fn fallback_rejects_short_fragments_and_known_topics() {
        let mut known = HashSet::new();
        known.insert("reconstructive memory neuroscience".to_string());

        // Known topic filtered out.
        assert!(fallback_topics(
            "I'm curious about reconstructive memory neuroscience.",
            "",
            &known
        )
        .is_empty());

        // One-word capture filtered out.
        assert!(fallback_topics("I'm curious about dogs.", "", &HashSet::new()).is_empty());
    }

    #[tokio::test]
    async fn fallback_path_dedups_across_calls() {
        // No replies: the LLM path fails, regex fallback kicks in.
        let (engine, _) = engine_with(vec![]);
        let message = "I'm curious about reconstructive memory neuroscience.";

        assert_eq!(engine.process_exchange(message, "Sure.").await.unwrap(), 1);
        assert_eq!(engine.process_exchange(message, "Sure.").await.unwrap(), 0);

        let counts = engine.store.curiosity_counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total, 1);
    }

    #[tokio::test]
    async fn llm_extraction_filters_and_caps_topics() {
        let reply = r#"["quantum entanglement basics", "ai", "neuroscience of memory", "theory of embodied cognition", "predictive processing models"]"#;
        let (engine, _) = engine_with(vec![reply.to_string()]);
        let queued = engine
            .process_exchange("what is entanglement?", "let me think")
            .await
            .unwrap();
        // "ai" fails the 2-word/10-char filter; cap is 3.
        assert_eq!(queued, 3);
    }

    #[tokio::test]
    async fn disabled_engine_queues_nothing() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::unavailable());
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        let engine = CuriosityEngine::new(store, gate, false);
        assert_eq!(
            engine
                .process_exchange("i'm curious about deep sea biology", "!")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn queue_processing_completes_items_and_stores_facts() {
        let (engine, backend) = engine_with(vec![]);
        engine
            .store
            .enqueue_curiosity("reconstructive memory neuroscience", "chat", 0.6)
            .unwrap();
        engine
            .store
            .enqueue_curiosity("predictive processing models", "chat", 0.5)
            .unwrap();
        backend.push_reply("Note on reconstructive memory: recall rebuilds rather than replays.");
        backend.push_reply("Note on predictive processing.");

        let processed = engine.process_queue(3, Some("Sygma"), None).await.unwrap();
        assert_eq!(processed, 2);

        let counts = engine.store.curiosity_counts().unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.completed, 2);

        let fact = engine
            .store
            .fact_by_topic("reconstructive memory neuroscience")
            .unwrap()
            .unwrap();
        assert_eq!(fact.source, "curiosity_research");
        assert!((fact.confidence - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_research_leaves_item_pending() {
        let (engine, _) = engine_with(vec![]);
        engine
            .store
            .enqueue_curiosity("some unresearched topic", "chat", 0.6)
            .unwrap();

        let processed = engine.process_queue(3, None, None).await.unwrap();
        assert_eq!(processed, 0);
        assert_eq!(engine.store.curiosity_counts().unwrap().pending, 1);
    }

    struct FixedSearch;

    #[async_trait]
    impl ResearchContext for FixedSearch {
        async fn context_for(&self, _topic: &str) -> Option<String> {
            Some("1. Result title — snippet".to_string())
        }
    }

    #[tokio::test]
    async fn search_context_reaches_the_research_prompt() {
        let (engine, backend) = engine_with(vec!["research notes".to_string()]);
        engine
            .store
            .enqueue_curiosity("neuroscience of memory", "chat", 0.6)
            .unwrap();

        engine
            .process_queue(1, None, Some(&FixedSearch))
            .await
            .unwrap();

        let prompt = &backend.requests()[0].prompt;
        assert!(prompt.contains("LIVE SEARCH RESULTS"));
        assert!(prompt.contains("Result title"));
    }
}
