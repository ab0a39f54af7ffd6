//! The LLM gate: the single choke-point through which every component talks
//! to the local model backend.
//!
//! The gate owns the model name and the hardware options derived from
//! config, and post-processes every response so that models which emit
//! reasoning blocks become indistinguishable from those that do not.
//! Behind it sits a [`Generator`] implementation — Ollama in production, a
//! scripted double in tests.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use nexira_config::HardwareConfig;

pub mod testing;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM backend error ({status}): {body}")]
    Backend { status: u16, body: String },
    #[error("LLM response missing text field")]
    MissingResponse,
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Runtime options passed to the backend with every request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerateOptions {
    pub num_ctx: u32,
    pub num_thread: u32,
    /// 999 offloads all layers to the GPU; 0 forces CPU.
    pub num_gpu: u32,
}

impl GenerateOptions {
    pub fn from_hardware(hardware: &HardwareConfig) -> Self {
        let num_gpu = if hardware.gpu_enabled && hardware.num_gpu > 0 {
            999
        } else {
            0
        };
        Self {
            num_ctx: hardware.context_window,
            num_thread: hardware.num_threads,
            num_gpu,
        }
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_ctx: 16384,
            num_thread: 4,
            num_gpu: 999,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub options: GenerateOptions,
}

/// Backend seam. Production uses [`OllamaClient`]; tests inject
/// [`testing::ScriptedGenerator`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// Ask the backend to drop the model from VRAM (keep_alive = 0).
    /// Default no-op for backends without that notion.
    async fn unload(&self, _model: &str) -> Result<()> {
        Ok(())
    }
}

/// Ollama `/api/generate` client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let mut payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": request.options,
        });
        if let Some(system) = &request.system {
            payload["system"] = json!(system);
        }

        let response = self.client.post(self.endpoint()).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Backend {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        body.get("response")
            .and_then(|value| value.as_str())
            .map(|text| text.to_string())
            .ok_or(LlmError::MissingResponse)
    }

    async fn unload(&self, model: &str) -> Result<()> {
        let payload = json!({ "model": model, "keep_alive": 0 });
        self.client
            .post(self.endpoint())
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        Ok(())
    }
}

/// The gate itself. Applies options, strips reasoning blocks, and is the
/// only place that knows which model is loaded.
#[derive(Clone)]
pub struct LlmGate {
    backend: Arc<dyn Generator>,
    model: String,
    options: GenerateOptions,
}

impl LlmGate {
    pub fn new(backend: Arc<dyn Generator>, model: impl Into<String>, options: GenerateOptions) -> Self {
        Self {
            backend,
            model: model.into(),
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        debug!(model = %self.model, prompt_len = prompt.len(), "gate: generate");
        let raw = self
            .backend
            .generate(GenerateRequest {
                model: self.model.clone(),
                prompt: prompt.to_string(),
                system: system.map(|s| s.to_string()),
                options: self.options,
            })
            .await?;
        Ok(strip_reasoning(&raw))
    }

    /// Release VRAM ahead of image generation.
    pub async fn unload(&self) -> Result<()> {
        self.backend.unload(&self.model).await
    }

    /// Trigger a model reload after the GPU has been handed back. Failures
    /// are only logged — the next real request reloads anyway.
    pub async fn warm(&self) {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: String::new(),
            system: None,
            options: self.options,
        };
        if let Err(err) = self.backend.generate(request).await {
            warn!(?err, "gate: warm-up request failed");
        }
    }
}

// ── Response post-processing ─────────────────────────────────────────────

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"))
}

fn live_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<<LIVE_(?:SEARCH_RESULTS|DATA_START)[^>]*>>.*?<<(?:END_LIVE_SEARCH|LIVE_DATA_END)[^>]*>>")
            .expect("static regex")
    })
}

fn stray_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<<[A-Z_]+[^>]*>>").expect("static regex"))
}

/// Remove reasoning blocks and hallucinated system tags from a model
/// response. Pure; applied to every gate result.
pub fn strip_reasoning(text: &str) -> String {
    let text = think_re().replace_all(text, "");
    let text = live_block_re().replace_all(&text, "");
    let text = stray_tag_re().replace_all(&text, "");
    text.trim().to_string()
}

// ── Lenient JSON extraction ──────────────────────────────────────────────

/// Pull the first JSON value (object or array) out of a larger text and
/// deserialize it. Tries a fenced ```json block first, then the widest
/// brace/bracket span. Returns `None` when nothing validates.
pub fn extract_json_value<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(fence_end) = after_fence.find("```") {
            if let Ok(value) = serde_json::from_str(after_fence[..fence_end].trim()) {
                return Some(value);
            }
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        let Some(start) = response.find(open) else {
            continue;
        };
        let Some(end) = response.rfind(close) else {
            continue;
        };
        if end > start {
            if let Ok(value) = serde_json::from_str(response[start..=end].trim()) {
                return Some(value);
            }
        }
    }

    None
}

/// Parse a JSON-object-per-line response, skipping lines that do not start
/// with `{` or fail to validate. The shape the extraction prompts ask for.
pub fn extract_json_lines<T: serde::de::DeserializeOwned>(response: &str) -> Vec<T> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if !line.starts_with('{') {
                return None;
            }
            serde_json::from_str(line).ok()
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct FactLine {
        topic: String,
        #[serde(default)]
        confidence: f64,
    }

    // ── strip_reasoning ────────────────────────────────────────────────

    #[test]
    fn strips_think_blocks() {
        let raw = "<think>planning my answer\nstep 2</think>Here is the answer.";
        assert_eq!(strip_reasoning(raw), "Here is the answer.");
    }

    #[test]
    fn strips_hallucinated_live_tags() {
        let raw = "Before <<LIVE_SEARCH_RESULTS q=x>>stale<<END_LIVE_SEARCH>> after";
        assert_eq!(strip_reasoning(raw), "Before  after");
    }

    #[test]
    fn strips_stray_system_markers() {
        let raw = "Answer <<LIVE_SEARCH_EMPTY>> done";
        assert_eq!(strip_reasoning(raw), "Answer  done");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(strip_reasoning("just text"), "just text");
    }

    #[test]
    fn strip_handles_multiple_think_blocks() {
        let raw = "<think>a</think>one<think>b</think> two";
        assert_eq!(strip_reasoning(raw), "one two");
    }

    // ── extract_json_value ─────────────────────────────────────────────

    #[test]
    fn extracts_fenced_array() {
        let raw = "Sure!\n```json\n[\"reconstructive memory\", \"confabulation\"]\n```";
        let topics: Vec<String> = extract_json_value(raw).unwrap();
        assert_eq!(topics.len(), 2);
    }

    #[test]
    fn extracts_bare_array_with_prose_around() {
        let raw = "Here you go: [\"ai consciousness theories\"] hope that helps";
        let topics: Vec<String> = extract_json_value(raw).unwrap();
        assert_eq!(topics[0], "ai consciousness theories");
    }

    #[test]
    fn extracts_bare_object() {
        let raw = "prefix {\"topic\": \"x\", \"confidence\": 0.8} suffix";
        let fact: FactLine = extract_json_value(raw).unwrap();
        assert_eq!(fact.topic, "x");
        assert!((fact.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn returns_none_for_plain_text() {
        assert!(extract_json_value::<Vec<String>>("no json here").is_none());
    }

    #[test]
    fn returns_none_for_malformed_fence() {
        assert!(extract_json_value::<Vec<String>>("```json\n[not json\n```").is_none());
    }

    // ── extract_json_lines ─────────────────────────────────────────────

    #[test]
    fn parses_object_per_line_and_skips_noise() {
        let raw = concat!(
            "Here are the facts:\n",
            "{\"topic\": \"alpha\", \"confidence\": 0.7}\n",
            "not json\n",
            "{\"topic\": \"beta\"}\n",
            "{broken\n",
        );
        let facts: Vec<FactLine> = extract_json_lines(raw);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].topic, "alpha");
        assert_eq!(facts[1].topic, "beta");
    }

    #[test]
    fn empty_response_yields_no_lines() {
        let facts: Vec<FactLine> = extract_json_lines("");
        assert!(facts.is_empty());
    }

    // ── GenerateOptions ────────────────────────────────────────────────

    #[test]
    fn gpu_disabled_forces_cpu() {
        let hardware = HardwareConfig {
            gpu_enabled: false,
            ..Default::default()
        };
        assert_eq!(GenerateOptions::from_hardware(&hardware).num_gpu, 0);
    }

    #[test]
    fn gpu_enabled_offloads_all_layers() {
        let options = GenerateOptions::from_hardware(&HardwareConfig::default());
        assert_eq!(options.num_gpu, 999);
        assert_eq!(options.num_ctx, 16384);
    }

    // ── Gate over a scripted backend ───────────────────────────────────

    #[tokio::test]
    async fn gate_strips_reasoning_from_backend_output() {
        let backend = Arc::new(testing::ScriptedGenerator::new(vec![
            "<think>hmm</think>clean answer".to_string(),
        ]));
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        let reply = gate.generate("hello", None).await.unwrap();
        assert_eq!(reply, "clean answer");
    }

    #[tokio::test]
    async fn scripted_generator_exhaustion_is_an_error() {
        let backend = Arc::new(testing::ScriptedGenerator::new(vec![]));
        let gate = LlmGate::new(backend, "qwen3:8b", GenerateOptions::default());
        assert!(gate.generate("hello", None).await.is_err());
    }
}
