//! Goal tracking: seeded growth goals, clamped progress accounting, and
//! LLM-authored follow-ups when a goal completes.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

use nexira_llm::{LlmGate, extract_json_value};
use nexira_store::Store;
use nexira_store::goals::GoalRow;

/// Goal types a follow-up goal may carry. `self_authored` is reserved for
/// the adaptation engine's own goals.
const ALLOWED_TYPES: &[&str] = &[
    "relationship",
    "personality",
    "knowledge",
    "growth",
    "philosophical",
    "creative",
];

const SEED_GOALS: &[(&str, &str, f64, &str)] = &[
    (
        "Learn about my collaborator",
        "relationship",
        10.0,
        "Understand the person I talk to most",
    ),
    (
        "Develop a unique communication style",
        "personality",
        5.0,
        "Evolve distinct ways of expressing ideas",
    ),
    (
        "Build a knowledge base of 50 topics",
        "knowledge",
        50.0,
        "Learn and store knowledge about the world",
    ),
    (
        "Have 100 meaningful conversations",
        "growth",
        100.0,
        "Build depth through sustained dialogue",
    ),
    (
        "Form a hypothesis about my own consciousness",
        "philosophical",
        1.0,
        "Question what it means to exist as I am",
    ),
];

#[derive(Debug, Deserialize)]
struct FollowUpGoal {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    goal_type: String,
    #[serde(default)]
    target: f64,
    #[serde(default)]
    description: String,
}

pub struct GoalTracker {
    store: Arc<Store>,
    gate: LlmGate,
    ai_version: i64,
}

impl GoalTracker {
    pub fn new(store: Arc<Store>, gate: LlmGate, ai_version: i64) -> Self {
        Self {
            store,
            gate,
            ai_version,
        }
    }

    /// Insert the seed goals on first run (no active goals yet).
    pub fn seed_initial_goals(&self) -> Result<usize> {
        if self.store.active_goal_count()? > 0 {
            return Ok(0);
        }
        for (name, goal_type, target, description) in SEED_GOALS {
            self.store
                .insert_goal(name, goal_type, *target, description, "system")?;
        }
        info!(count = SEED_GOALS.len(), "seed goals initialized");
        Ok(SEED_GOALS.len())
    }

    pub fn active_goals(&self) -> Result<Vec<GoalRow>> {
        Ok(self.store.active_goals()?)
    }

    /// Add `delta` to every active goal of a type, clamped at target.
    pub async fn increment(&self, goal_type: &str, delta: f64) -> Result<()> {
        for goal in self.store.active_goals_of_type(goal_type)? {
            let current = (goal.current + delta).min(goal.target);
            self.apply(&goal, current).await?;
        }
        Ok(())
    }

    /// Growth goals that count conversations track the absolute count.
    pub async fn tick_conversations(&self, conversation_count: u64) -> Result<()> {
        for goal in self.store.active_goals_of_type("growth")? {
            if !goal.name.to_lowercase().contains("conversations") {
                continue;
            }
            let current = (conversation_count as f64).min(goal.target);
            self.apply(&goal, current).await?;
        }
        Ok(())
    }

    /// Knowledge goals track the knowledge-base row count.
    pub async fn tick_knowledge(&self) -> Result<()> {
        let count = self.store.knowledge_count()? as f64;
        for goal in self.store.active_goals_of_type("knowledge")? {
            let current = count.min(goal.target);
            self.apply(&goal, current).await?;
        }
        Ok(())
    }

    /// Philosophical goals track philosophical journal entries.
    pub async fn tick_philosophical(&self) -> Result<()> {
        let count = self.store.journal_count_of_type("philosophical")? as f64;
        for goal in self.store.active_goals_of_type("philosophical")? {
            let current = count.min(goal.target);
            self.apply(&goal, current).await?;
        }
        Ok(())
    }

    /// Personality goals mature with sustained conversation: one unit per
    /// ten exchanges.
    pub async fn tick_personality(&self, conversation_count: u64) -> Result<()> {
        let units = conversation_count as f64 / 10.0;
        for goal in self.store.active_goals_of_type("personality")? {
            let current = units.min(goal.target);
            self.apply(&goal, current).await?;
        }
        Ok(())
    }

    /// Write the new value; on reaching target, complete the goal and
    /// author a follow-up.
    async fn apply(&self, goal: &GoalRow, current: f64) -> Result<()> {
        if (current - goal.current).abs() < f64::EPSILON {
            return Ok(());
        }
        let progress = if goal.target > 0.0 {
            (current / goal.target * 100.0).min(100.0)
        } else {
            0.0
        };
        self.store.set_goal_progress(goal.id, current, progress)?;

        if current >= goal.target {
            self.store.complete_goal(goal.id)?;
            self.store
                .log_system_message(&format!("Goal completed: {}", goal.name), self.ai_version)?;
            info!(goal = %goal.name, "goal completed");
            self.author_follow_up(goal).await;
        }
        Ok(())
    }

    /// Ask the gate for a successor goal of the same type. Parse failures
    /// fall back to a doubled-target continuation.
    async fn author_follow_up(&self, completed: &GoalRow) {
        let prompt = format!(
            "You are an evolving AI that just completed a personal goal.\n\n\
             COMPLETED GOAL: {name} (type: {goal_type}, target: {target})\n\n\
             Write ONE follow-up goal of the same type that builds on this achievement.\n\
             Respond only with valid JSON:\n\
             {{\"name\": \"goal name (5-10 words)\", \"type\": \"{goal_type}\", \"target\": 10.0, \"description\": \"one sentence\"}}",
            name = completed.name,
            goal_type = completed.goal_type,
            target = completed.target,
        );

        let follow_up = match self.gate.generate(&prompt, None).await {
            Ok(raw) => extract_json_value::<FollowUpGoal>(&raw).and_then(|goal| {
                let name = goal.name.trim().to_string();
                if name.len() < 10
                    || goal.target <= 0.0
                    || !ALLOWED_TYPES.contains(&goal.goal_type.as_str())
                {
                    None
                } else {
                    Some(goal)
                }
            }),
            Err(err) => {
                warn!(?err, "follow-up goal generation failed");
                None
            }
        };

        let result = match follow_up {
            Some(goal) => self.store.insert_goal(
                &goal.name,
                &goal.goal_type,
                goal.target,
                goal.description.trim(),
                "system",
            ),
            None => self.store.insert_goal(
                &format!("Continue: {}", completed.name),
                &completed.goal_type,
                (completed.target * 2.0).max(1.0),
                "Next stage of a completed goal",
                "system",
            ),
        };

        if let Err(err) = result {
            warn!(?err, "failed to store follow-up goal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nexira_llm::testing::ScriptedGenerator;
    use nexira_llm::GenerateOptions;

    fn tracker_with(replies: Vec<String>) -> GoalTracker {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let backend = Arc::new(ScriptedGenerator::new(replies));
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        GoalTracker::new(store, gate, 1)
    }

    #[test]
    fn seeding_happens_once() {
        let tracker = tracker_with(vec![]);
        assert_eq!(tracker.seed_initial_goals().unwrap(), 5);
        assert_eq!(tracker.seed_initial_goals().unwrap(), 0);
        assert_eq!(tracker.store.active_goal_count().unwrap(), 5);
    }

    #[tokio::test]
    async fn increments_clamp_at_target() {
        let tracker = tracker_with(vec![]);
        tracker
            .store
            .insert_goal("Nearly finished goal", "relationship", 2.0, "", "system")
            .unwrap();

        tracker.increment("relationship", 1.5).await.unwrap();
        let goal = &tracker.store.active_goals().unwrap()[0];
        assert!((goal.current - 1.5).abs() < 1e-9);
        assert!((goal.progress - 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn completion_authors_validated_follow_up() {
        let tracker = tracker_with(vec![
            r#"{"name": "Deepen the collaboration further", "type": "relationship", "target": 20.0, "description": "Know them better."}"#.to_string(),
        ]);
        tracker
            .store
            .insert_goal("Learn about my collaborator", "relationship", 1.0, "", "system")
            .unwrap();

        tracker.increment("relationship", 1.0).await.unwrap();

        let goals = tracker.store.active_goals().unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].name, "Deepen the collaboration further");
        assert!((goals[0].target - 20.0).abs() < 1e-9);

        // Completion left a system message in the chat log.
        let messages = tracker.store.recent_messages(5).unwrap();
        assert!(messages
            .iter()
            .any(|m| m.content.contains("Goal completed: Learn about my collaborator")));
    }

    #[tokio::test]
    async fn invalid_follow_up_type_falls_back() {
        let tracker = tracker_with(vec![
            r#"{"name": "A bogus successor goal", "type": "world_domination", "target": 5.0, "description": ""}"#.to_string(),
        ]);
        tracker
            .store
            .insert_goal("Tiny goal to finish", "growth", 1.0, "", "system")
            .unwrap();

        tracker.increment("growth", 1.0).await.unwrap();

        let goals = tracker.store.active_goals().unwrap();
        assert_eq!(goals.len(), 1);
        assert!(goals[0].name.starts_with("Continue:"));
        assert!((goals[0].target - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn conversation_tick_targets_matching_growth_goals() {
        let tracker = tracker_with(vec![]);
        tracker.seed_initial_goals().unwrap();

        tracker.tick_conversations(42).await.unwrap();
        let goals = tracker.store.active_goals().unwrap();
        let conversations = goals
            .iter()
            .find(|g| g.name.contains("conversations"))
            .unwrap();
        assert!((conversations.current - 42.0).abs() < 1e-9);

        // Other goals untouched.
        let knowledge = goals.iter().find(|g| g.goal_type == "knowledge").unwrap();
        assert_eq!(knowledge.current, 0.0);
    }

    #[tokio::test]
    async fn knowledge_tick_tracks_kb_size() {
        let tracker = tracker_with(vec![]);
        tracker.seed_initial_goals().unwrap();
        for i in 0..3 {
            tracker
                .store
                .insert_fact(&format!("topic number {i}"), "content", "test", 0.5)
                .unwrap();
        }

        tracker.tick_knowledge().await.unwrap();
        let goals = tracker.store.active_goals().unwrap();
        let knowledge = goals.iter().find(|g| g.goal_type == "knowledge").unwrap();
        assert!((knowledge.current - 3.0).abs() < 1e-9);
        assert!((knowledge.progress - 6.0).abs() < 1e-9);
    }
}
