//! Web search via DuckDuckGo: the instant-answer JSON API first, the HTML
//! endpoint as a fallback. No API key involved. Results are formatted into
//! a context block for the system prompt and logged for the history view.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nexira_cognition::ResearchContext;
use nexira_store::Store;

const DDG_API: &str = "https://api.duckduckgo.com/";
const DDG_HTML: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; Nexira/1.0)";
const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize, Default)]
struct InstantAnswer {
    #[serde(default, rename = "Heading")]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize, Default)]
struct RelatedTopic {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
}

/// Parse the DDG HTML results page. Pure so the selector logic is testable
/// offline.
pub fn parse_html_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse("div.result").expect("static selector");
    let link_selector = Selector::parse("a.result__a").expect("static selector");
    let snippet_selector = Selector::parse(".result__snippet").expect("static selector");

    let mut results = Vec::new();
    for element in document.select(&result_selector) {
        let Some(link) = element.select(&link_selector).next() else {
            continue;
        };
        let title: String = link.text().collect::<String>().trim().to_string();
        let url = link.value().attr("href").unwrap_or_default().to_string();
        let snippet = element
            .select(&snippet_selector)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        if !title.is_empty() {
            results.push(SearchResult {
                title,
                url,
                snippet: snippet.chars().take(300).collect(),
            });
        }
        if results.len() >= max_results {
            break;
        }
    }
    results
}

pub struct WebSearchService {
    store: Arc<Store>,
    client: reqwest::Client,
}

impl WebSearchService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Search and log. `source` labels who initiated (chat, curiosity,
    /// api). Failures degrade to an empty result list.
    pub async fn search(&self, query: &str, max_results: usize, source: &str) -> Vec<SearchResult> {
        let mut results = match self.instant_answers(query).await {
            Ok(results) => results,
            Err(err) => {
                debug!(?err, query, "instant-answer search failed");
                Vec::new()
            }
        };

        if results.is_empty() {
            match self.html_results(query, max_results).await {
                Ok(html_results) => results = html_results,
                Err(err) => warn!(?err, query, "html search fallback failed"),
            }
        }

        results.truncate(max_results);
        let top = results.first().map(|r| r.title.clone()).unwrap_or_default();
        if let Err(err) = self.store.log_search(query, results.len(), source, &top) {
            warn!(?err, "search log write failed");
        }
        results
    }

    async fn instant_answers(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(DDG_API)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("t", "Nexira")])
            .header("User-Agent", USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .context("instant answer request")?;
        let data: InstantAnswer = response.json().await.context("instant answer body")?;

        let mut results = Vec::new();
        if !data.abstract_text.is_empty() {
            results.push(SearchResult {
                title: if data.heading.is_empty() {
                    query.to_string()
                } else {
                    data.heading
                },
                url: data.abstract_url,
                snippet: data.abstract_text.chars().take(400).collect(),
            });
        }
        for topic in data.related_topics.into_iter().take(4) {
            if topic.text.is_empty() {
                continue;
            }
            results.push(SearchResult {
                title: topic.text.chars().take(80).collect(),
                url: topic.first_url,
                snippet: topic.text.chars().take(300).collect(),
            });
        }
        Ok(results)
    }

    async fn html_results(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .post(DDG_HTML)
            .form(&[("q", query), ("b", "")])
            .header("User-Agent", USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .context("html search request")?;
        let body = response.text().await.context("html search body")?;
        Ok(parse_html_results(&body, max_results))
    }

    pub fn history(&self, limit: usize) -> Result<Vec<nexira_store::outputs::SearchLogRow>> {
        Ok(self.store.search_history(limit)?)
    }
}

/// Format results into the block injected into the system prompt.
pub fn format_for_context(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut lines = vec![format!("LIVE SEARCH RESULTS for \"{query}\":")];
    for (index, result) in results.iter().enumerate() {
        lines.push(format!("{}. {} — {}", index + 1, result.title, result.snippet));
        if !result.url.is_empty() {
            lines.push(format!("   {}", result.url));
        }
    }
    lines.join("\n")
}

#[async_trait]
impl ResearchContext for WebSearchService {
    async fn context_for(&self, topic: &str) -> Option<String> {
        let results = self.search(topic, 5, "curiosity").await;
        if results.is_empty() {
            None
        } else {
            Some(format_for_context(topic, &results))
        }
    }
}
