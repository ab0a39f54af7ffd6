//! The runtime handle: every engine and collaborator, assembled once at
//! startup and shared by the gateway and the scheduler.
//!
//! Construction order matters only in that engines are built first and the
//! scheduler borrows references to them afterwards; nothing holds a
//! reference back to the scheduler.

mod chat;
mod consolidation;
mod prompt;
mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::info;

use nexira_actions::ActionPipeline;
use nexira_cognition::{
    CuriosityEngine, GoalTracker, InterestTracker, JournalSystem, SelfAdaptation,
    SelfAwarenessMeter, SkillTracker,
};
use nexira_config::AppConfig;
use nexira_llm::{GenerateOptions, Generator, LlmGate, OllamaClient};
use nexira_memory::MemoryEngine;
use nexira_personality::{EmotionalState, PersonalityEngine};
use nexira_services::{
    BackupManager, EmailService, ImageGenService, MoltbookService, WebSearchService,
};
use nexira_store::{SecretBox, Store};

pub use chat::{ChatOutcome, detect_name_request};
pub use consolidation::ConsolidationOutcome;
pub use scheduler::{Clock, Scheduler, SystemClock};

/// Event fanned out to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeEvent {
    pub kind: String,
    pub label: String,
    pub detail: String,
}

pub struct Runtime {
    /// Live config, shared with the email/social/image collaborators so a
    /// config patch applies without a restart.
    pub config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
    base_dir: PathBuf,
    pub store: Arc<Store>,
    pub secret_box: Arc<SecretBox>,
    pub gate: LlmGate,
    pub personality: Arc<PersonalityEngine>,
    pub memory: Arc<MemoryEngine>,
    pub curiosity: Arc<CuriosityEngine>,
    pub interests: Arc<InterestTracker>,
    pub skills: Arc<SkillTracker>,
    pub adaptation: Arc<SelfAdaptation>,
    pub awareness: Arc<SelfAwarenessMeter>,
    pub goals: Arc<GoalTracker>,
    pub journal: Arc<JournalSystem>,
    pub actions: Arc<ActionPipeline>,
    pub search: Arc<WebSearchService>,
    pub moltbook: Arc<MoltbookService>,
    pub email: Arc<EmailService>,
    pub images: Arc<ImageGenService>,
    pub backup: Arc<BackupManager>,
    pub(crate) emotional: Mutex<EmotionalState>,
    conversation_count: AtomicU64,
    started_at: Instant,
    /// Previous assistant response, for correction learning.
    pub(crate) last_response: Mutex<Option<String>>,
    events: broadcast::Sender<RuntimeEvent>,
}

impl Runtime {
    /// Production constructor: Ollama backend from config.
    pub fn new(config: AppConfig, config_path: PathBuf, base_dir: PathBuf) -> Result<Arc<Self>> {
        let backend: Arc<dyn Generator> = Arc::new(OllamaClient::new(&config.ai.ollama_url));
        Self::with_backend(config, config_path, base_dir, backend)
    }

    /// Constructor with an injected LLM backend (tests use a scripted one).
    pub fn with_backend(
        mut config: AppConfig,
        config_path: PathBuf,
        base_dir: PathBuf,
        backend: Arc<dyn Generator>,
    ) -> Result<Arc<Self>> {
        let store = Arc::new(
            Store::open(base_dir.join("data").join("databases").join("evolution.db"))
                .context("opening store")?,
        );
        let secret_box = Arc::new(SecretBox::init(base_dir.join("data").join("nexira.key")));

        // First launch: stamp the birth date and enter the unnamed state.
        if config.ai.first_launch {
            config.ai.created_date = Some(nexira_store::now_iso());
            config.ai.ai_name = None;
            config.ai.awaiting_name = true;
            config.ai.first_launch = false;
            config.save_to(&config_path).context("saving first-launch config")?;
            info!("first launch: awaiting self-chosen name");
        }

        let options = GenerateOptions::from_hardware(&config.hardware);
        let gate = LlmGate::new(backend, config.ai.model.clone(), options);
        let ai_version = config.ai.ai_version as i64;

        let personality = Arc::new(PersonalityEngine::new(
            store.clone(),
            config.personality.evolution_speed,
            config.personality.auto_evolution,
            ai_version,
        )?);
        let memory = Arc::new(MemoryEngine::new(
            store.clone(),
            gate.clone(),
            config.memory.clone(),
            config.ai.user_name.clone(),
        ));
        let curiosity = Arc::new(CuriosityEngine::new(
            store.clone(),
            gate.clone(),
            config.intelligence.curiosity_enabled,
        ));
        let interests = Arc::new(InterestTracker::new(store.clone()));
        let skills = Arc::new(SkillTracker::new(store.clone()));
        let adaptation = Arc::new(SelfAdaptation::new(store.clone(), gate.clone()));
        let awareness = Arc::new(SelfAwarenessMeter::new(store.clone()));
        let goals = Arc::new(GoalTracker::new(store.clone(), gate.clone(), ai_version));
        goals.seed_initial_goals()?;
        let journal = Arc::new(JournalSystem::new(
            store.clone(),
            gate.clone(),
            secret_box.clone(),
        ));

        // From here on the config is shared: the collaborators below read
        // their sections fresh on every call, so /api/config patches land
        // without rebuilding them.
        let config = Arc::new(RwLock::new(config));

        let search = Arc::new(WebSearchService::new(store.clone()));
        let moltbook = Arc::new(MoltbookService::new(store.clone(), config.clone()));
        let email = Arc::new(EmailService::new(
            store.clone(),
            secret_box.clone(),
            config.clone(),
        ));
        let images = Arc::new(ImageGenService::new(
            store.clone(),
            gate.clone(),
            config.clone(),
            &base_dir,
        ));
        let backup = Arc::new(
            BackupManager::new(&base_dir, &config_path).context("initializing backups")?,
        );

        let actions = Arc::new(
            ActionPipeline::new(store.clone())
                .with_social(moltbook.clone())
                .with_images(images.clone())
                .with_email(email.clone()),
        );

        let conversation_count = store.user_message_count()? as u64;
        let (events, _) = broadcast::channel(256);

        Ok(Arc::new(Self {
            config,
            config_path,
            base_dir,
            store,
            secret_box,
            gate,
            personality,
            memory,
            curiosity,
            interests,
            skills,
            adaptation,
            awareness,
            goals,
            journal,
            actions,
            search,
            moltbook,
            email,
            images,
            backup,
            emotional: Mutex::new(EmotionalState::default()),
            conversation_count: AtomicU64::new(conversation_count),
            started_at: Instant::now(),
            last_response: Mutex::new(None),
            events,
        }))
    }

    pub fn ai_name(&self) -> Option<String> {
        self.config.read().expect("config lock").ai.ai_name.clone()
    }

    pub fn user_name(&self) -> String {
        let name = self.config.read().expect("config lock").ai.user_name.clone();
        if name.is_empty() { "my collaborator".to_string() } else { name }
    }

    pub fn ai_version(&self) -> i64 {
        self.config.read().expect("config lock").ai.ai_version as i64
    }

    pub fn conversation_count(&self) -> u64 {
        self.conversation_count.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_conversation_count(&self) -> u64 {
        self.conversation_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Clone of the current emotional state, for read-only surfaces.
    pub async fn emotional_snapshot(&self) -> EmotionalState {
        self.emotional.lock().await.clone()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn save_config(&self) -> Result<()> {
        let config = self.config.read().expect("config lock").clone();
        config.save_to(&self.config_path)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish_event(&self, kind: &str, label: &str, detail: &str) {
        let _ = self.events.send(RuntimeEvent {
            kind: kind.to_string(),
            label: label.to_string(),
            detail: detail.to_string(),
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use nexira_llm::testing::ScriptedGenerator;

    /// Runtime over a temp directory and a scripted backend.
    pub fn runtime_with(
        replies: Vec<&str>,
    ) -> (Arc<Runtime>, Arc<ScriptedGenerator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedGenerator::new(
            replies.into_iter().map(|r| r.to_string()).collect(),
        ));
        let mut config = AppConfig::default();
        config.ai.user_name = "Xeeker".to_string();
        // Most tests exercise the named state; naming-flow tests override.
        config.ai.first_launch = false;
        config.ai.ai_name = Some("Sygma".to_string());

        let runtime = Runtime::with_backend(
            config,
            dir.path().join("config/default_config.json"),
            dir.path().to_path_buf(),
            backend.clone(),
        )
        .unwrap();
        (runtime, backend, dir)
    }
}
