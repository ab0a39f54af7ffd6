//! Three-tier memory: the raw chat log, rolling episode summaries, and the
//! weekly synthesis that commits durable knowledge.
//!
//! The raw tier lives entirely in the store. This crate owns the two
//! derived tiers: a background summarizer that compresses every N new
//! messages into an episode, and the once-per-ISO-week synthesis that
//! turns uncommitted episodes into confidence-weighted knowledge facts.

mod episodes;
mod retrieval;
mod weekly;

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;

use nexira_config::MemoryConfig;
use nexira_llm::LlmGate;
use nexira_store::Store;

pub use episodes::{estimate_importance, parse_summary_response};
pub use retrieval::EpisodeContext;
pub use weekly::{WeeklyOutcome, parse_synthesis_response, topic_frequency};

pub struct MemoryEngine {
    store: Arc<Store>,
    gate: LlmGate,
    config: MemoryConfig,
    user_name: String,
    /// At most one summarization runs at a time; range selection happens
    /// under this lock so concurrent triggers cannot cover the same ids.
    summarize_lock: Mutex<()>,
}

impl MemoryEngine {
    pub fn new(store: Arc<Store>, gate: LlmGate, config: MemoryConfig, user_name: String) -> Self {
        Self {
            store,
            gate,
            config,
            user_name,
            summarize_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub(crate) fn gate(&self) -> &LlmGate {
        &self.gate
    }

    pub(crate) fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub(crate) fn user_name(&self) -> &str {
        if self.user_name.is_empty() {
            "User"
        } else {
            &self.user_name
        }
    }

    pub(crate) fn summarize_lock(&self) -> &Mutex<()> {
        &self.summarize_lock
    }

    pub fn stats(&self) -> anyhow::Result<nexira_store::episodes::EpisodeStats> {
        Ok(self.store.episode_stats()?)
    }
}

/// ISO week number for a local timestamp.
pub fn iso_week(now: DateTime<Local>) -> i64 {
    use chrono::Datelike;
    now.iso_week().week() as i64
}
