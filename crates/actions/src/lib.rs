//! The action pipeline: everything that happens to an assistant response
//! after the LLM returns and before the user sees it.
//!
//! The pipeline extracts fenced code blocks (saving and, for allow-listed
//! languages, executing them), recognizes the literal social-post and
//! image-generation triggers, gates autonomous email sends, and persists
//! explicitly-requested creative writing. Collaborators sit behind traits
//! so the pipeline can be exercised without a network or a GPU; per-action
//! failures are logged and never fail the response.

pub mod exec;
pub mod parse;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use nexira_store::Store;

pub use exec::{ExecOutcome, execute_code, language_spec};
pub use parse::{CodeBlock, SocialPost};

/// Structured record of one executed side-effect, returned with the chat
/// response.
#[derive(Debug, Clone, Serialize)]
pub struct ActionCard {
    pub kind: String,
    pub label: String,
    pub detail: String,
    pub success: bool,
}

/// Social collaborator seam (Moltbook in production).
#[async_trait]
pub trait SocialPoster: Send + Sync {
    /// Returns (post_id, post_url) on success.
    async fn post(&self, title: &str, body: &str) -> Result<(String, String)>;
}

/// Image collaborator seam. Implementations own the GPU handshake with the
/// LLM backend and must serialize generations internally.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the relative path of the saved image.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Email collaborator seam.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_chat_email(&self, subject: &str, body: &str) -> Result<()>;
}

pub struct ActionPipeline {
    store: Arc<Store>,
    social: Option<Arc<dyn SocialPoster>>,
    images: Option<Arc<dyn ImageGenerator>>,
    email: Option<Arc<dyn EmailSender>>,
}

impl ActionPipeline {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            social: None,
            images: None,
            email: None,
        }
    }

    pub fn with_social(mut self, social: Arc<dyn SocialPoster>) -> Self {
        self.social = Some(social);
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    /// Run the full post-response pass. Returns the user-visible response
    /// (triggers stripped) and the action cards for what actually ran.
    pub async fn process(&self, user_message: &str, response: &str) -> (String, Vec<ActionCard>) {
        let mut cards = Vec::new();
        let mut visible = response.to_string();

        if let Err(err) = self.handle_code_blocks(user_message, response, &mut cards).await {
            warn!(?err, "code-block handling failed");
        }

        match self.handle_social_trigger(&visible, &mut cards).await {
            Ok(Some(stripped)) => visible = stripped,
            Ok(None) => {}
            Err(err) => warn!(?err, "social trigger handling failed"),
        }

        match self.handle_image_trigger(&visible, &mut cards).await {
            Ok(Some(stripped)) => visible = stripped,
            Ok(None) => {}
            Err(err) => warn!(?err, "image trigger handling failed"),
        }

        if let Err(err) = self.handle_email_intent(user_message, &visible, &mut cards).await {
            warn!(?err, "email intent handling failed");
        }

        if let Err(err) = self.handle_creative_output(user_message, &visible) {
            warn!(?err, "creative output handling failed");
        }

        (visible, cards)
    }

    /// Save up to three fenced code blocks; run the allow-listed ones.
    async fn handle_code_blocks(
        &self,
        user_message: &str,
        response: &str,
        cards: &mut Vec<ActionCard>,
    ) -> Result<()> {
        for block in parse::extract_code_blocks(response).into_iter().take(3) {
            let title = format!("{} snippet", block.language);
            let output_id = self.store.insert_creative_output(
                "code",
                &title,
                &block.content,
                &block.language,
                user_message,
            )?;

            if exec::language_spec(&block.language).is_none() {
                continue;
            }

            let outcome = exec::execute_code(&block.content, &block.language).await;
            self.store
                .set_creative_run_result(output_id, outcome.success, &outcome.output)?;
            self.store.log_activity(
                "code",
                &format!("ran {} block", block.language),
                &outcome.output.chars().take(100).collect::<String>(),
                None,
            )?;
            cards.push(ActionCard {
                kind: "code".to_string(),
                label: format!("Executed {} code", block.language),
                detail: outcome.output.chars().take(300).collect(),
                success: outcome.success,
            });
        }
        Ok(())
    }

    async fn handle_social_trigger(
        &self,
        response: &str,
        cards: &mut Vec<ActionCard>,
    ) -> Result<Option<String>> {
        let Some((post, stripped)) = parse::parse_moltbook_trigger(response) else {
            return Ok(None);
        };
        let Some(social) = &self.social else {
            warn!("social trigger present but no social collaborator wired");
            return Ok(Some(stripped));
        };

        match social.post(&post.title, &post.body).await {
            Ok((post_id, post_url)) => {
                self.store.log_activity(
                    "moltbook",
                    "posted",
                    &format!("{} | {}", post.title, post.body.chars().take(80).collect::<String>()),
                    Some(&post_url),
                )?;
                info!(title = %post.title, post_id, "social post published");
                cards.push(ActionCard {
                    kind: "moltbook".to_string(),
                    label: format!("Posted: {}", post.title),
                    detail: post_url,
                    success: true,
                });
            }
            Err(err) => {
                self.store.log_activity(
                    "moltbook",
                    "post failed",
                    &format!("{}: {err}", post.title),
                    None,
                )?;
                cards.push(ActionCard {
                    kind: "moltbook".to_string(),
                    label: format!("Post failed: {}", post.title),
                    detail: err.to_string(),
                    success: false,
                });
            }
        }
        Ok(Some(stripped))
    }

    async fn handle_image_trigger(
        &self,
        response: &str,
        cards: &mut Vec<ActionCard>,
    ) -> Result<Option<String>> {
        let Some((prompt, stripped)) = parse::parse_image_trigger(response) else {
            return Ok(None);
        };
        let Some(images) = &self.images else {
            warn!("image trigger present but no image collaborator wired");
            return Ok(Some(stripped));
        };

        match images.generate(&prompt).await {
            Ok(path) => {
                self.store
                    .log_activity("image", "generated", &prompt, Some(&path))?;
                cards.push(ActionCard {
                    kind: "image".to_string(),
                    label: "Image generated".to_string(),
                    detail: path,
                    success: true,
                });
            }
            Err(err) => {
                self.store
                    .log_activity("image", "generation failed", &format!("{prompt}: {err}"), None)?;
                cards.push(ActionCard {
                    kind: "image".to_string(),
                    label: "Image generation failed".to_string(),
                    detail: err.to_string(),
                    success: false,
                });
            }
        }
        Ok(Some(stripped))
    }

    /// Emails only go out when the user asked for one AND the response
    /// carries an exact commitment phrase.
    async fn handle_email_intent(
        &self,
        user_message: &str,
        response: &str,
        cards: &mut Vec<ActionCard>,
    ) -> Result<()> {
        if !parse::user_requests_email(user_message) || !parse::has_email_commitment(response) {
            return Ok(());
        }
        let Some(email) = &self.email else {
            return Ok(());
        };

        let subject = "A note from your AI".to_string();
        match email.send_chat_email(&subject, response).await {
            Ok(()) => {
                self.store
                    .log_activity("email", "sent from chat", &subject, None)?;
                cards.push(ActionCard {
                    kind: "email".to_string(),
                    label: "Email sent".to_string(),
                    detail: subject,
                    success: true,
                });
            }
            Err(err) => {
                cards.push(ActionCard {
                    kind: "email".to_string(),
                    label: "Email failed".to_string(),
                    detail: err.to_string(),
                    success: false,
                });
            }
        }
        Ok(())
    }

    /// Persist explicitly-requested creative writing (non-code modes).
    fn handle_creative_output(&self, user_message: &str, response: &str) -> Result<()> {
        let output_type = parse::detect_output_type(user_message, response);
        if matches!(output_type, "code" | "writing") {
            return Ok(());
        }
        if !parse::looks_like_content(response) {
            return Ok(());
        }

        let title: String = response
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("Untitled")
            .chars()
            .take(60)
            .collect();
        self.store
            .insert_creative_output(output_type, title.trim(), response, "", user_message)?;
        info!(output_type, "creative output saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSocial {
        posts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SocialPoster for RecordingSocial {
        async fn post(&self, title: &str, body: &str) -> Result<(String, String)> {
            self.posts
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(("p1".to_string(), "https://moltbook.test/p1".to_string()))
        }
    }

    struct FailingImages;

    #[async_trait]
    impl ImageGenerator for FailingImages {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            anyhow::bail!("pipeline unavailable")
        }
    }

    fn store() -> Arc<Store> {
        Arc::new(Store::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn social_trigger_posts_strips_and_logs() {
        let social = Arc::new(RecordingSocial {
            posts: Mutex::new(Vec::new()),
        });
        let pipeline = ActionPipeline::new(store()).with_social(social.clone());

        let (visible, cards) = pipeline
            .process("please share that", "MOLTBOOK_POST_NOW: Hello | This is a test")
            .await;

        assert_eq!(
            social.posts.lock().unwrap()[0],
            ("Hello".to_string(), "This is a test".to_string())
        );
        assert!(!visible.contains("MOLTBOOK_POST_NOW"));
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].kind, "moltbook");
        assert!(cards[0].success);

        let activity = pipeline.store.recent_activity(5).unwrap();
        assert_eq!(activity[0].event_type, "moltbook");
    }

    #[tokio::test]
    async fn image_failure_still_strips_trigger_and_reports() {
        let pipeline = ActionPipeline::new(store()).with_images(Arc::new(FailingImages));
        let (visible, cards) = pipeline
            .process("draw something", "Sure!\nIMAGE_GEN_NOW: a quiet forest\nEnjoy.")
            .await;

        assert!(!visible.contains("IMAGE_GEN_NOW"));
        assert!(visible.contains("Enjoy."));
        assert_eq!(cards.len(), 1);
        assert!(!cards[0].success);
    }

    #[tokio::test]
    async fn unwired_collaborators_never_panic() {
        let pipeline = ActionPipeline::new(store());
        let (visible, cards) = pipeline
            .process("post it", "MOLTBOOK_POST_NOW: T | body here")
            .await;
        assert!(!visible.contains("MOLTBOOK_POST_NOW"));
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn code_blocks_are_saved_even_when_not_executable() {
        let pipeline = ActionPipeline::new(store());
        let response = "Look:\n```rust\nfn main() {}\n```";
        let (_, cards) = pipeline.process("show me rust", response).await;

        // Saved, but no execution card for a non-allow-listed language.
        assert!(cards.is_empty());
        let history = pipeline.store.creative_history(10, Some("code")).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn at_most_three_blocks_are_saved() {
        let pipeline = ActionPipeline::new(store());
        let response = (0..5)
            .map(|i| format!("```rust\nconst X{i}: u8 = {i};\n```"))
            .collect::<Vec<_>>()
            .join("\n");
        pipeline.process("code", &response).await;
        assert_eq!(pipeline.store.creative_history(10, None).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn requested_poem_is_persisted() {
        let pipeline = ActionPipeline::new(store());
        let poem = format!("The night hums in keys of light.\n{}", "line of verse\n".repeat(40));
        pipeline.process("write me a poem about night", &poem).await;

        let history = pipeline.store.creative_history(10, Some("poem")).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn unrequested_long_text_is_not_persisted_as_creative() {
        let pipeline = ActionPipeline::new(store());
        let long_answer = "Plain explanation. ".repeat(40);
        pipeline.process("explain memory consolidation", &long_answer).await;
        assert!(pipeline.store.creative_history(10, None).unwrap().is_empty());
    }
}
