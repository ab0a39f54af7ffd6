//! Scripted backend for tests: replies are served in order, and every
//! request is recorded so assertions can inspect the prompts that reached
//! the gate.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{GenerateRequest, Generator, LlmError, Result};

#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
    unloads: Mutex<u32>,
}

impl ScriptedGenerator {
    /// Replies are popped front-to-back; a call past the end fails like an
    /// unreachable backend.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            unloads: Mutex::new(0),
        }
    }

    /// A backend that always fails, for degraded-path tests.
    pub fn unavailable() -> Self {
        Self::new(Vec::new())
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push(reply.into());
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn unload_count(&self) -> u32 {
        *self.unloads.lock().unwrap()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(LlmError::Backend {
                status: 503,
                body: "scripted generator exhausted".to_string(),
            });
        }
        Ok(replies.remove(0))
    }

    async fn unload(&self, _model: &str) -> Result<()> {
        *self.unloads.lock().unwrap() += 1;
        Ok(())
    }
}
