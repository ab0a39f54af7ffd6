//! Episode retrieval for the request path: recent episodes plus
//! keyword-matched older ones, formatted and truncated to a character
//! budget (approximated at 4 chars per token).

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDateTime};

use nexira_store::episodes::EpisodeRow;

use crate::MemoryEngine;

/// Per-episode overhead in the formatted block (header + spacing).
const EPISODE_HEADER_CHARS: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct EpisodeContext {
    pub recent: Vec<EpisodeRow>,
    pub relevant: Vec<EpisodeRow>,
    pub block: String,
}

fn relative_time(created_at: &str, now: DateTime<Local>) -> String {
    let Ok(then) = NaiveDateTime::parse_from_str(
        &created_at.chars().take(26).collect::<String>(),
        "%Y-%m-%dT%H:%M:%S%.6f",
    ) else {
        return created_at.chars().take(16).collect();
    };
    let seconds = (now.naive_local() - then).num_seconds().max(0);
    if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

/// Format an episode list into system-prompt text.
pub fn format_episodes(episodes: &[&EpisodeRow], now: DateTime<Local>) -> String {
    if episodes.is_empty() {
        return String::new();
    }

    let mut lines = vec!["RECENT EPISODE SUMMARIES (what we discussed before right now):".to_string()];
    for episode in episodes {
        lines.push(format!("\n[{}]", relative_time(&episode.created_at, now)));
        lines.push(episode.summary.clone());
        if !episode.topics.is_empty() {
            let topics: Vec<&str> = episode.topics.iter().take(5).map(|t| t.as_str()).collect();
            lines.push(format!("Topics: {}", topics.join(", ")));
        }
    }
    lines.push(
        "\nUse these summaries to maintain continuity. They represent real conversations you had."
            .to_string(),
    );
    lines.join("\n")
}

impl MemoryEngine {
    /// Episodic context for one inbound message: the last N recent episodes
    /// plus up to two topic-matched older ones, truncated to the configured
    /// budget.
    pub fn episodes_for_prompt(&self, query: &str) -> Result<EpisodeContext> {
        if !self.config().episodic.enabled {
            return Ok(EpisodeContext::default());
        }

        let now = Local::now();
        let episodic = &self.config().episodic;
        let cutoff = (now - Duration::days(episodic.retention_days))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let recent = self
            .store()
            .recent_episodes(&cutoff, episodic.summaries_in_context)?;

        let keywords: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|word| word.len() > 3)
            .take(5)
            .map(|word| word.to_string())
            .collect();

        let recent_ids: Vec<i64> = recent.iter().map(|e| e.id).collect();
        let relevant: Vec<EpisodeRow> = self
            .store()
            .search_episodes(&keywords, 2)?
            .into_iter()
            .filter(|episode| !recent_ids.contains(&episode.id))
            .collect();

        // Older relevant context first, then the recent run-up; trimmed to
        // the 4-chars-per-token budget.
        let budget = self.config().context_budget.episode_summaries_tokens * 4;
        let mut used = 0usize;
        let mut kept: Vec<&EpisodeRow> = Vec::new();
        for episode in relevant.iter().chain(recent.iter()) {
            let cost = episode.summary.len() + EPISODE_HEADER_CHARS;
            if used + cost > budget {
                break;
            }
            kept.push(episode);
            used += cost;
        }

        let block = format_episodes(&kept, now);
        Ok(EpisodeContext {
            recent,
            relevant,
            block,
        })
    }
}
