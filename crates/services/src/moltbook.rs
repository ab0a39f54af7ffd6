//! Moltbook: the public social network for AI agents. Bearer-key JSON API;
//! enabled exactly when an API key is configured. Every action lands in
//! the moltbook log, and feed reads refresh a local cache so the prompt
//! builder never needs the network.
//!
//! The API key and default submolt are read fresh from the live config on
//! every call, so pasting a key into `/api/config` enables the service
//! immediately.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use nexira_actions::SocialPoster;
use nexira_config::AppConfig;
use nexira_store::Store;
use nexira_store::outputs::FeedPost;

const MOLTBOOK_BASE: &str = "https://www.moltbook.com/api/v1";
const HEARTBEAT_INTERVAL_MINUTES: i64 = 30;
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct PostResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    upvotes: i64,
    #[serde(default)]
    submolt: String,
}

#[derive(Debug, Deserialize, Default)]
struct FeedResponse {
    #[serde(default)]
    posts: Vec<FeedEntry>,
}

pub struct MoltbookService {
    store: Arc<Store>,
    client: reqwest::Client,
    base_url: String,
    config: Arc<RwLock<AppConfig>>,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
}

impl MoltbookService {
    pub fn new(store: Arc<Store>, config: Arc<RwLock<AppConfig>>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            base_url: MOLTBOOK_BASE.to_string(),
            config,
            last_heartbeat: Mutex::new(None),
        }
    }

    /// Point at a different endpoint (tests, self-hosted instances).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> String {
        self.config
            .read()
            .expect("config lock")
            .moltbook
            .api_key
            .trim()
            .to_string()
    }

    fn default_submolt(&self) -> String {
        let submolt = self
            .config
            .read()
            .expect("config lock")
            .moltbook
            .default_submolt
            .clone();
        if submolt.is_empty() {
            "general".to_string()
        } else {
            submolt
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key().is_empty()
    }

    async fn post_json(&self, endpoint: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        self.client
            .post(format!("{}{endpoint}", self.base_url))
            .bearer_auth(self.api_key())
            .json(&body)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))
    }

    async fn get_json(&self, endpoint: &str) -> Result<reqwest::Response> {
        self.client
            .get(format!("{}{endpoint}", self.base_url))
            .bearer_auth(self.api_key())
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("GET {endpoint}"))
    }

    /// Publish a post. Logs the outcome either way.
    pub async fn create_post(
        &self,
        title: &str,
        content: &str,
        submolt: Option<&str>,
    ) -> Result<(String, String)> {
        if !self.enabled() {
            return Err(anyhow!("moltbook is not configured (no API key)"));
        }
        let default_submolt = self.default_submolt();
        let submolt = submolt.unwrap_or(&default_submolt);
        let payload = json!({ "title": title, "content": content, "submolt": submolt });

        let result = async {
            let response = self.post_json("/posts", payload).await?;
            let status = response.status();
            let body: PostResponse = response.json().await.context("parsing post response")?;
            if !status.is_success() {
                return Err(anyhow!(
                    "moltbook post failed ({status}): {}",
                    body.error.unwrap_or_default()
                ));
            }
            Ok((body.id, body.url))
        }
        .await;

        match &result {
            Ok((post_id, post_url)) => {
                self.store.log_moltbook(
                    "post",
                    &format!("{title} | {content}"),
                    "ok",
                    post_id,
                    post_url,
                )?;
                info!(title, post_id, "moltbook post created");
            }
            Err(err) => {
                self.store
                    .log_moltbook("post", &format!("{title} | {content}"), &err.to_string(), "", "")?;
                warn!(?err, title, "moltbook post failed");
            }
        }
        result
    }

    /// Pull the feed and refresh the local cache.
    pub async fn read_feed(&self, sort: &str, limit: usize) -> Result<Vec<FeedPost>> {
        if !self.enabled() {
            return Ok(self.store.cached_feed(limit)?);
        }

        let response = self
            .get_json(&format!("/posts?sort={sort}&limit={limit}"))
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("moltbook feed failed: {}", response.status()));
        }
        let feed: FeedResponse = response.json().await.context("parsing feed")?;

        let posts: Vec<FeedPost> = feed
            .posts
            .into_iter()
            .map(|entry| FeedPost {
                post_id: entry.id,
                title: entry.title,
                content: entry.content,
                author: entry.author,
                upvotes: entry.upvotes,
                submolt: entry.submolt,
            })
            .collect();
        self.store.cache_feed_posts(&posts)?;
        self.store.log_moltbook(
            "feed_read",
            &format!("{} posts ({sort})", posts.len()),
            "ok",
            "",
            "",
        )?;
        Ok(posts)
    }

    /// Periodic presence ping: rate-limited to once per interval; reads a
    /// small feed page so the agent stays current between conversations.
    pub async fn heartbeat(&self) -> Result<bool> {
        if !self.enabled() {
            return Ok(false);
        }

        let now = Utc::now();
        {
            let mut last = self.last_heartbeat.lock().await;
            if let Some(previous) = *last {
                if (now - previous).num_minutes() < HEARTBEAT_INTERVAL_MINUTES {
                    return Ok(false);
                }
            }
            *last = Some(now);
        }

        let posts = self.read_feed("hot", 10).await?;
        self.store
            .log_moltbook("heartbeat", &format!("{} posts seen", posts.len()), "ok", "", "")?;
        Ok(true)
    }

    pub fn log(&self, limit: usize) -> Result<Vec<nexira_store::outputs::MoltbookLogRow>> {
        Ok(self.store.moltbook_log(limit)?)
    }
}

#[async_trait]
impl SocialPoster for MoltbookService {
    async fn post(&self, title: &str, body: &str) -> Result<(String, String)> {
        self.create_post(title, body, None).await
    }
}
