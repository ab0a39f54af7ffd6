use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Self-chosen name. `None` until the naming flow has run.
    pub ai_name: Option<String>,
    pub ai_version: u32,
    pub user_name: String,
    pub model: String,
    pub ollama_url: String,
    pub created_date: Option<String>,
    pub first_launch: bool,
    pub awaiting_name: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            ai_name: None,
            ai_version: 1,
            user_name: String::new(),
            model: "qwen3:8b".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            created_date: None,
            first_launch: true,
            awaiting_name: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub context_window: u32,
    pub num_threads: u32,
    pub gpu_enabled: bool,
    pub num_gpu: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            context_window: 16384,
            num_threads: 4,
            gpu_enabled: true,
            num_gpu: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    pub auto_evolution: bool,
    pub evolution_speed: f64,
    pub manual_evolution_enabled: bool,
    pub drift_alert_threshold: f64,
    pub allow_emergent_traits: bool,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            auto_evolution: true,
            evolution_speed: 0.02,
            manual_evolution_enabled: true,
            drift_alert_threshold: 0.3,
            allow_emergent_traits: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodicConfig {
    pub enabled: bool,
    pub background_summarization: bool,
    pub summarize_every_n_messages: u32,
    pub summaries_in_context: usize,
    pub retention_days: i64,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            background_summarization: true,
            summarize_every_n_messages: 20,
            summaries_in_context: 4,
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyConfig {
    pub enabled: bool,
    pub min_confirmations_for_longterm: u32,
    pub confidence_twice: f64,
    pub confidence_three_plus: f64,
}

impl Default for WeeklyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confirmations_for_longterm: 2,
            confidence_twice: 0.65,
            confidence_three_plus: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudgetConfig {
    pub episode_summaries_tokens: usize,
}

impl Default for ContextBudgetConfig {
    fn default() -> Self {
        Self {
            episode_summaries_tokens: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemoryConfig {
    pub episodic: EpisodicConfig,
    pub weekly_consolidation: WeeklyConfig,
    pub context_budget: ContextBudgetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceConfig {
    pub curiosity_enabled: bool,
    /// "HH:MM" local time for the nightly consolidation run.
    pub night_consolidation_time: String,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            curiosity_enabled: true,
            night_consolidation_time: "02:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    pub creative_journaling_enabled: bool,
    pub philosophical_journaling_enabled: bool,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            creative_journaling_enabled: true,
            philosophical_journaling_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    /// Stored encrypted (secret-box `ENC:` prefix) once email config is saved.
    pub password: String,
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyEmailConfig {
    pub enabled: bool,
    pub send_time: String,
    pub recipient: String,
}

impl Default for DailyEmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            send_time: "20:00".to_string(),
            recipient: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MoltbookConfig {
    pub api_key: String,
    pub agent_name: String,
    pub default_submolt: String,
    pub auto_post_diary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageGenConfig {
    pub enabled: bool,
    /// Local Stable Diffusion sidecar endpoint.
    pub sd_url: String,
    pub default_steps: u32,
    pub default_guidance: f64,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sd_url: "http://localhost:7860".to_string(),
            default_steps: 25,
            default_guidance: 7.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebInterfaceConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebInterfaceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ai: AiConfig,
    pub hardware: HardwareConfig,
    pub personality: PersonalityConfig,
    pub memory: MemoryConfig,
    pub intelligence: IntelligenceConfig,
    pub autonomy: AutonomyConfig,
    pub email: EmailConfig,
    pub daily_email: DailyEmailConfig,
    pub moltbook: MoltbookConfig,
    pub image_gen: ImageGenConfig,
    pub web_interface: WebInterfaceConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load the JSON config from `path`, falling back to defaults for any
    /// missing section so a partial file from an older version still loads.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.is_empty() {
                config.ai.ollama_url = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = serde_json::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Merge a JSON patch into the current config, recursively, so partial
    /// updates from the config endpoint never clobber sibling sections.
    pub fn apply_patch(&mut self, patch: &serde_json::Value) -> Result<()> {
        let mut base = serde_json::to_value(&*self)?;
        deep_merge(&mut base, patch);
        *self = serde_json::from_value(base)?;
        Ok(())
    }

    /// Hour component of the configured night-consolidation time.
    pub fn consolidation_hour(&self) -> u32 {
        self.intelligence
            .night_consolidation_time
            .split(':')
            .next()
            .and_then(|h| h.parse().ok())
            .unwrap_or(2)
    }

    /// (hour, minute) of the configured daily-summary send time.
    pub fn daily_email_time(&self) -> (u32, u32) {
        let mut parts = self.daily_email.send_time.split(':');
        let hour = parts.next().and_then(|h| h.parse().ok()).unwrap_or(20);
        let minute = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
        (hour, minute)
    }

    pub fn display_name(&self) -> &str {
        self.ai.ai_name.as_deref().unwrap_or("AI Consciousness")
    }
}

fn deep_merge(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.personality.evolution_speed, 0.02);
        assert_eq!(config.memory.episodic.summarize_every_n_messages, 20);
        assert_eq!(config.consolidation_hour(), 2);
        assert_eq!(config.daily_email_time(), (20, 0));
        assert!(config.ai.ai_name.is_none());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("nope.json")).unwrap();
        assert!(config.ai.first_launch);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.ai.ai_name = Some("Sygma".to_string());
        config.ai.first_launch = false;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.ai.ai_name.as_deref(), Some("Sygma"));
        assert!(!loaded.ai.first_launch);
    }

    #[test]
    fn partial_file_is_repaired_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"ai": {"model": "llama3.1:8b"}}"#).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.ai.model, "llama3.1:8b");
        // Missing sections come back as defaults, not errors.
        assert_eq!(loaded.intelligence.night_consolidation_time, "02:00");
        assert!(loaded.autonomy.creative_journaling_enabled);
    }

    #[test]
    fn patch_merges_without_clobbering_siblings() {
        let mut config = AppConfig::default();
        config.email.smtp_server = "mail.example.org".to_string();

        let patch = serde_json::json!({"email": {"smtp_port": 465}});
        config.apply_patch(&patch).unwrap();

        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.email.smtp_server, "mail.example.org");
    }

    #[test]
    fn malformed_send_time_falls_back() {
        let mut config = AppConfig::default();
        config.daily_email.send_time = "whenever".to_string();
        assert_eq!(config.daily_email_time(), (20, 0));
    }
}
