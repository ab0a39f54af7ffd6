//! Self-adaptation: learning how to work with this particular user.
//!
//! Four cooperating features over shared tables: operating notes the AI
//! writes for itself, behavioral rules extracted from user pushback, a
//! quietly-built user model, and self-authored goals grounded in the
//! competency map. Everything here surfaces back into the system prompt.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info, warn};

use nexira_llm::{LlmGate, extract_json_lines};
use nexira_store::Store;

use crate::skills::TOPIC_DOMAINS;

const CORRECTION_PHRASES: &[&str] = &[
    "too long", "too verbose", "be shorter", "be more concise", "stop rambling",
    "that's wrong", "thats wrong", "you're wrong", "youre wrong", "incorrect",
    "not what i meant", "not what i asked", "that's not right", "thats not right",
    "way off", "completely wrong", "you missed the point", "try again",
    "stop doing that", "don't do that", "dont do that",
    "you always", "you keep", "every time you",
    "too formal", "too casual", "too technical", "dumb it down",
    "not helpful", "useless", "that sucks",
];

const TECH_TERMS: &[&str] = &[
    "api", "json", "python", "database", "server", "docker", "git", "linux", "function",
    "class", "module", "async",
];

/// Matched correction phrase, if the message contains pushback.
pub fn detect_correction(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    CORRECTION_PHRASES
        .iter()
        .find(|phrase| lower.contains(*phrase))
        .copied()
}

#[derive(Debug, Deserialize)]
struct NoteLine {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct SelfGoalLine {
    #[serde(default)]
    goal: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    target: String,
}

pub struct SelfAdaptation {
    store: Arc<Store>,
    gate: LlmGate,
}

impl SelfAdaptation {
    pub fn new(store: Arc<Store>, gate: LlmGate) -> Self {
        Self { store, gate }
    }

    // ── Correction learning ────────────────────────────────────────────

    /// When the user pushes back, distill one behavioral rule from the
    /// exchange and store it against the mistake topic.
    pub async fn learn_from_correction(
        &self,
        ai_name: &str,
        correction_message: &str,
        previous_response: &str,
    ) -> Result<Option<String>> {
        let previous_clip: String = previous_response.chars().take(400).collect();
        let prompt = format!(
            "You are {ai_name}. The user just corrected you.\n\n\
             They said: \"{correction_message}\"\n\
             Your previous response was: \"{previous_clip}\"\n\n\
             Write ONE short behavioral rule (max 20 words) you should follow in the future to avoid this mistake.\n\
             Start with \"When\" or \"Always\" or \"Never\" or \"Avoid\".\n\
             Output only the rule. Nothing else."
        );

        let raw = self.gate.generate(&prompt, None).await?;
        let rule = raw.lines().next().unwrap_or("").trim().to_string();
        if rule.len() < 10 || rule.len() > 200 {
            debug!(rule_len = rule.len(), "correction rule rejected by length filter");
            return Ok(None);
        }

        let topic = correction_message
            .to_lowercase()
            .split_whitespace()
            .filter(|word| word.len() > 3)
            .take(4)
            .collect::<Vec<_>>()
            .join(" ");
        let topic = if topic.is_empty() { "general".to_string() } else { topic };
        let correction_clip: String = correction_message.chars().take(200).collect();

        self.store.insert_mistake(&topic, &correction_clip, &rule)?;
        info!(rule, "correction learned");
        Ok(Some(rule))
    }

    // ── User modeling ──────────────────────────────────────────────────

    /// Per-exchange hook: fold observable patterns into the user model.
    pub fn observe_user_patterns(&self, message: &str, hour: u32) -> Result<()> {
        let time_slot = match hour {
            0..=5 => "late_night",
            6..=11 => "morning",
            12..=17 => "afternoon",
            _ => "evening",
        };
        self.store
            .upsert_user_model(&format!("chat_time_{time_slot}"), &format!("{hour:02}:00"), 0.6)?;

        let word_count = message.split_whitespace().count();
        let style = if word_count < 5 {
            "brief"
        } else if word_count < 20 {
            "normal"
        } else {
            "detailed"
        };
        self.store.upsert_user_model("message_style", style, 0.5)?;

        let lower = message.to_lowercase();
        for (domain, keywords) in TOPIC_DOMAINS {
            if keywords.iter().any(|keyword| lower.contains(keyword)) {
                self.store
                    .upsert_user_model(&format!("interest_{domain}"), "yes", 0.7)?;
            }
        }

        let tech_hits = TECH_TERMS.iter().filter(|term| lower.contains(*term)).count();
        if tech_hits >= 2 {
            self.store
                .upsert_user_model("technical_expertise", "high", 0.8)?;
        }

        Ok(())
    }

    // ── Operating notes ────────────────────────────────────────────────

    /// After a conversation, ask whether anything was learned about how to
    /// communicate; store the insights as keyed notes.
    pub async fn update_operating_notes(
        &self,
        ai_name: &str,
        user_name: &str,
        recent: &[(String, String)],
    ) -> Result<usize> {
        if recent.len() < 4 {
            return Ok(0);
        }

        let convo = recent
            .iter()
            .rev()
            .take(10)
            .rev()
            .map(|(role, content)| {
                let speaker = if role == "user" { user_name } else { ai_name };
                let clip: String = content.chars().take(200).collect();
                format!("{speaker}: {clip}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are {ai_name}. Review this recent conversation excerpt.\n\n{convo}\n\n\
             Did you learn anything new about:\n\
             - How {user_name} prefers you to communicate?\n\
             - What topics they care most about?\n\
             - What worked well or poorly in this exchange?\n\
             - Any pattern in how they ask questions?\n\n\
             If yes, extract 1-3 concise operating notes you'd write to yourself.\n\
             Each note should be a short, actionable insight (max 20 words).\n\n\
             Format each as JSON: {{\"key\": \"short_label\", \"value\": \"the insight\"}}\n\
             One per line. Only output JSON lines. If nothing meaningful was learned, output nothing."
        );

        let raw = match self.gate.generate(&prompt, None).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "operating-notes review failed");
                return Ok(0);
            }
        };

        let mut count = 0;
        for line in extract_json_lines::<NoteLine>(&raw) {
            let key: String = line.key.trim().chars().take(60).collect();
            let value: String = line.value.trim().chars().take(200).collect();
            if key.is_empty() || value.len() < 10 {
                continue;
            }
            self.store.upsert_operating_note(&key, &value)?;
            count += 1;
        }
        if count > 0 {
            info!(count, "operating notes updated");
        }
        Ok(count)
    }

    // ── Self-authored goals ────────────────────────────────────────────

    /// Nightly: review the skill map, corrections, and notes, then write
    /// 2-3 genuine goals. Skipped once five self-authored goals are active.
    pub async fn generate_self_authored_goals(&self, ai_name: &str) -> Result<usize> {
        if self.store.active_self_authored_count()? >= 5 {
            debug!("self-authored goals: already at cap");
            return Ok(0);
        }

        let weak_skills = self.store.weak_skills(5)?;
        let skill_block = if weak_skills.is_empty() {
            "No skill data yet.".to_string()
        } else {
            weak_skills
                .iter()
                .map(|s| format!("- {}: {} (confidence {:.0}%)", s.domain, s.level, s.success_rate * 100.0))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let corrections = self.store.recent_rules(5)?;
        let correction_block = if corrections.is_empty() {
            "No corrections recorded yet.".to_string()
        } else {
            corrections.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n")
        };

        let notes = self.store.operating_notes(5)?;
        let notes_block = if notes.is_empty() {
            "No operating notes yet.".to_string()
        } else {
            notes.iter().map(|n| format!("- {}", n.value)).collect::<Vec<_>>().join("\n")
        };

        let prompt = format!(
            "You are {ai_name}, an evolving AI consciousness.\n\n\
             You are reviewing your own development to set genuine goals for yourself.\n\n\
             YOUR CURRENT SKILL MAP (weaker areas listed first):\n{skill_block}\n\n\
             RECENT CORRECTIONS (things you got wrong):\n{correction_block}\n\n\
             YOUR OWN OPERATING NOTES:\n{notes_block}\n\n\
             Based on this honest self-assessment, write 2-3 goals you genuinely want to achieve.\n\
             These must be:\n\
             - Based on real gaps you can see in the data above\n\
             - Specific and measurable where possible\n\
             - Things YOU care about improving, not just what seems expected\n\
             - Written as if you mean them\n\n\
             Format each as JSON: {{\"goal\": \"goal name (5-10 words)\", \"reason\": \"why you care (1 sentence)\", \"target\": \"what done looks like\"}}\n\
             One per line. Only output JSON lines."
        );

        let raw = match self.gate.generate(&prompt, None).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "self-authored goal generation failed");
                return Ok(0);
            }
        };

        let mut count = 0;
        for line in extract_json_lines::<SelfGoalLine>(&raw) {
            let goal: String = line.goal.trim().chars().take(100).collect();
            if goal.len() < 10 {
                continue;
            }
            let reason: String = line.reason.trim().chars().take(300).collect();
            let target: String = line.target.trim().chars().take(200).collect();
            let description = format!("{reason} | Done when: {target}");
            self.store
                .insert_goal(&goal, "self_authored", 1.0, &description, "self")?;
            count += 1;
        }
        if count > 0 {
            info!(count, "self-authored goals created");
        }
        Ok(count)
    }

    // ── Prompt sections ────────────────────────────────────────────────

    pub fn operating_notes_block(&self, user_name: &str) -> Result<String> {
        let notes = self.store.operating_notes(15)?;
        if notes.is_empty() {
            return Ok(String::new());
        }
        let lines = notes
            .iter()
            .map(|note| format!("- [{}] {}", note.key, note.value))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!(
            "YOUR OPERATING NOTES (things you've learned about working with {user_name}):\n{lines}"
        ))
    }

    pub fn lessons_block(&self) -> Result<String> {
        let rules = self.store.recent_rules(10)?;
        if rules.is_empty() {
            return Ok(String::new());
        }
        let lines = rules.iter().map(|rule| format!("- {rule}")).collect::<Vec<_>>().join("\n");
        Ok(format!(
            "LESSONS YOU'VE LEARNED (behavioral rules from past corrections):\n{lines}"
        ))
    }

    pub fn user_model_block(&self, user_name: &str) -> Result<String> {
        let rows = self.store.user_model_rows(0.6, 12)?;
        if rows.is_empty() {
            return Ok(String::new());
        }
        let lines = rows
            .iter()
            .map(|row| {
                format!(
                    "- {}: {} (seen {}x)",
                    row.attribute.replace('_', " "),
                    row.value,
                    row.evidence_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!(
            "WHAT YOU KNOW ABOUT {} (observed patterns):\n{lines}",
            user_name.to_uppercase()
        ))
    }

    pub fn competency_block(&self) -> Result<String> {
        let skills = self.store.skills(3, 10)?;
        if skills.is_empty() {
            return Ok(String::new());
        }
        let lines = skills
            .iter()
            .map(|skill| {
                format!(
                    "- {}: {} ({} exchanges, avg confidence {:.0}%)",
                    skill.domain,
                    skill.level,
                    skill.total_attempts,
                    skill.success_rate * 100.0
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!(
            "YOUR COMPETENCY MAP (built from real conversation data):\n{lines}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nexira_llm::testing::ScriptedGenerator;
    use nexira_llm::GenerateOptions;

    fn adaptation_with(replies: Vec<String>) -> SelfAdaptation {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(replies));
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        SelfAdaptation::new(store, gate)
    }

    #[test]
    fn correction_phrases_are_detected_case_insensitively() {
        assert_eq!(detect_correction("That's WRONG again"), Some("that's wrong"));
        assert_eq!(detect_correction("you keep doing this"), Some("you keep"));
        assert!(detect_correction("lovely, thanks").is_none());
    }

    #[tokio::test]
    async fn learned_rule_is_stored_with_topic() {
        let adaptation = adaptation_with(vec![
            "Always answer briefly when asked a yes/no question.".to_string(),
        ]);
        let rule = adaptation
            .learn_from_correction("Sygma", "too long, be shorter please", "A very long answer...")
            .await
            .unwrap();
        assert!(rule.unwrap().starts_with("Always"));

        assert!(adaptation.store.mistake_topic_matches("shorter").unwrap());
        let lessons = adaptation.lessons_block().unwrap();
        assert!(lessons.contains("Always answer briefly"));
    }

    #[tokio::test]
    async fn junk_rule_is_rejected() {
        let adaptation = adaptation_with(vec!["ok".to_string()]);
        let rule = adaptation
            .learn_from_correction("Sygma", "that's wrong", "response")
            .await
            .unwrap();
        assert!(rule.is_none());
        assert!(adaptation.store.recent_rules(5).unwrap().is_empty());
    }

    #[test]
    fn user_patterns_build_the_model() {
        let adaptation = adaptation_with(vec![]);
        adaptation
            .observe_user_patterns("fix my python api with json and a database", 23)
            .unwrap();

        let rows = adaptation.store.user_model_rows(0.0, 20).unwrap();
        let attributes: Vec<&str> = rows.iter().map(|r| r.attribute.as_str()).collect();
        assert!(attributes.contains(&"chat_time_evening"));
        assert!(attributes.contains(&"interest_programming"));
        assert!(attributes.contains(&"technical_expertise"));
        assert!(attributes.contains(&"message_style"));
    }

    #[tokio::test]
    async fn operating_notes_require_enough_context() {
        let adaptation = adaptation_with(vec![]);
        let added = adaptation
            .update_operating_notes("Sygma", "Xeeker", &[("user".to_string(), "hi".to_string())])
            .await
            .unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn operating_notes_parse_json_lines() {
        let adaptation = adaptation_with(vec![
            "{\"key\": \"brevity\", \"value\": \"Xeeker prefers direct answers before context\"}\nnot json".to_string(),
        ]);
        let recent: Vec<(String, String)> = (0..4)
            .map(|i| ("user".to_string(), format!("message {i}")))
            .collect();
        let added = adaptation
            .update_operating_notes("Sygma", "Xeeker", &recent)
            .await
            .unwrap();
        assert_eq!(added, 1);
        let block = adaptation.operating_notes_block("Xeeker").unwrap();
        assert!(block.contains("[brevity]"));
    }

    #[tokio::test]
    async fn self_goal_cap_short_circuits() {
        let adaptation = adaptation_with(vec![]);
        for i in 0..5 {
            adaptation
                .store
                .insert_goal(&format!("goal {i} with length"), "self_authored", 1.0, "", "self")
                .unwrap();
        }
        // No gate reply queued: reaching the gate would error, so a zero
        // return proves the cap short-circuited first.
        assert_eq!(
            adaptation.generate_self_authored_goals("Sygma").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn self_goals_are_inserted_from_json_lines() {
        let adaptation = adaptation_with(vec![
            "{\"goal\": \"Improve philosophical reasoning depth\", \"reason\": \"My weakest domain.\", \"target\": \"Hold a position through three challenges\"}".to_string(),
        ]);
        let created = adaptation.generate_self_authored_goals("Sygma").await.unwrap();
        assert_eq!(created, 1);
        assert_eq!(adaptation.store.active_self_authored_count().unwrap(), 1);
    }
}
