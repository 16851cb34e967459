//! `web_search`: web search through a search provider, or fetch of a URL.

use crate::error::ToolError;
use crate::tool::{Tool, ToolDefinition, str_arg, u64_arg};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_RESULTS: usize = 5;
const MAX_RESULTS: usize = 10;
const MAX_PAGE_CHARS: usize = 4000;
const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; ParlanceBot/1.0)";

static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<noscript[^>]*>.*?</noscript>",
    )
    .expect("valid hidden-block pattern")
});
static TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));

/// Builds the link offered when the search provider cannot answer.
#[must_use]
pub fn fallback_search_link(query: &str) -> String {
    reqwest::Url::parse_with_params("https://www.google.com/search", &[("q", query)])
        .map(String::from)
        .unwrap_or_else(|_| format!("https://www.google.com/search?q={query}"))
}

/// A web search backend.
///
/// Implementations never fail: when unconfigured or erroring they return a
/// notice that includes [`fallback_search_link`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Searches and returns a formatted text summary.
    async fn search(&self, query: &str, max_results: usize) -> String;
}

#[derive(Debug, Default, Deserialize)]
struct SerpApiResponse {
    knowledge_graph: Option<KnowledgeGraph>,
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeGraph {
    title: Option<String>,
    description: Option<String>,
    source: Option<KnowledgeSource>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeSource {
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
    title: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

fn format_search_results(data: &SerpApiResponse, query: &str, max_results: usize) -> String {
    let mut sections = Vec::new();

    if let Some(graph) = &data.knowledge_graph {
        if let (Some(title), Some(description)) = (&graph.title, &graph.description) {
            sections.push(format!("**{title}**\n{description}"));
            if let Some(link) = graph.source.as_ref().and_then(|s| s.link.as_ref()) {
                sections.push(format!("Source: {link}"));
            }
        }
    }

    if let Some(answer_box) = &data.answer_box {
        if let Some(answer) = &answer_box.answer {
            sections.push(format!("**Answer**: {answer}"));
        } else if let Some(snippet) = &answer_box.snippet {
            let title = answer_box.title.as_deref().unwrap_or("Answer");
            sections.push(format!("**{title}**: {snippet}"));
        }
        if let Some(link) = &answer_box.link {
            sections.push(format!("Source: {link}"));
        }
    }

    if !data.organic_results.is_empty() {
        sections.push("\n**Search Results:**".to_string());
        for (position, result) in data.organic_results.iter().take(max_results).enumerate() {
            let (Some(title), Some(link)) = (&result.title, &result.link) else {
                continue;
            };
            let mut entry = format!("{}. **{title}**", position + 1);
            if let Some(snippet) = &result.snippet {
                entry.push_str(&format!("\n   {snippet}"));
            }
            entry.push_str(&format!("\n   Link: {link}"));
            sections.push(entry);
        }
    }

    if sections.is_empty() {
        format!(
            "No results found for \"{query}\". Try: {}",
            fallback_search_link(query)
        )
    } else {
        format!(
            "Search results for \"{query}\":\n\n{}",
            sections.join("\n\n")
        )
    }
}

/// Google search through SerpAPI.
#[derive(Debug, Clone)]
pub struct SerpApiSearch {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SerpApiSearch {
    /// Creates a provider. Without a key every search degrades to a link.
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: SERPAPI_ENDPOINT.to_string(),
        }
    }

    /// Overrides the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn query(
        &self,
        api_key: &str,
        query: &str,
        max_results: usize,
    ) -> Result<SerpApiResponse, String> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", api_key),
                ("num", &max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("SerpAPI returned {}", response.status().as_u16()));
        }

        let data: SerpApiResponse = response.json().await.map_err(|e| e.to_string())?;
        match &data.error {
            Some(error) => Err(format!("SerpAPI error: {error}")),
            None => Ok(data),
        }
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> String {
        let Some(api_key) = &self.api_key else {
            debug!("no search key configured");
            return format!(
                "Web search requires a SerpAPI key. Get one at https://serpapi.com/\nFallback: {}",
                fallback_search_link(query)
            );
        };

        match self.query(api_key, query, max_results).await {
            Ok(data) => format_search_results(&data, query, max_results),
            Err(reason) => {
                warn!(error = %reason, "search provider failed");
                format!(
                    "Search failed: {reason}. Try: {}",
                    fallback_search_link(query)
                )
            }
        }
    }
}

/// Strips markup from an HTML page and collapses whitespace.
#[must_use]
pub fn extract_text_from_html(html: &str) -> String {
    let visible = HIDDEN_BLOCKS.replace_all(html, "");
    let text = TAGS.replace_all(&visible, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_page(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(MAX_PAGE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Web search or page fetch.
#[derive(Clone)]
pub struct WebTool {
    http: reqwest::Client,
    search: Arc<dyn SearchProvider>,
}

impl WebTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(http: reqwest::Client, search: Arc<dyn SearchProvider>) -> Self {
        Self { http, search }
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            name: "web_search".to_string(),
            reason: reason.into(),
        }
    }

    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| Self::failed(format!("invalid URL: {e}")))?;

        let response = self
            .http
            .get(parsed)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| Self::failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        if !content_type.contains("text/") {
            return Err(Self::failed("Unsupported content type"));
        }

        let body = response.text().await.map_err(|e| Self::failed(e.to_string()))?;
        let text = extract_text_from_html(&body);
        if text.is_empty() {
            return Ok(format!("No readable content found at {url}"));
        }
        Ok(format!("Content from {url}:\n\n{}", truncate_page(&text)))
    }
}

#[async_trait]
impl Tool for WebTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "web_search",
            "Search the web using Google or fetch content from a specific URL",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query for Google search" },
                "url": {
                    "type": "string",
                    "description": "Specific URL to fetch content from (alternative to search)"
                },
                "num_results": {
                    "type": "number",
                    "description": "Number of search results to return (default: 5, max: 10)",
                    "default": DEFAULT_RESULTS
                }
            },
            "required": []
        }))
    }

    async fn execute(&self, arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        if let Some(url) = str_arg(&arguments, "url") {
            let content = self.fetch(url).await?;
            return Ok(json!({ "content": content }));
        }

        if let Some(query) = str_arg(&arguments, "query") {
            let max_results = u64_arg(&arguments, "num_results")
                .map_or(DEFAULT_RESULTS, |n| usize::try_from(n).unwrap_or(MAX_RESULTS))
                .clamp(1, MAX_RESULTS);
            let content = self.search.search(query, max_results).await;
            return Ok(json!({ "content": content }));
        }

        Ok(json!({ "error": "Either query or url parameter is required" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSearch {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl SearchProvider for RecordingSearch {
        async fn search(&self, query: &str, max_results: usize) -> String {
            self.calls
                .lock()
                .expect("lock")
                .push((query.to_string(), max_results));
            format!("results for {query}")
        }
    }

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn fallback_link_is_url_encoded() {
        let link = fallback_search_link("phở bò & bún");
        assert!(link.starts_with("https://www.google.com/search?q="));
        assert!(!link.contains(' '));
        assert!(!link.contains('&'));
        assert!(link.contains("%26"));
    }

    #[test]
    fn html_is_reduced_to_visible_text() {
        let html = r#"<html><head><style>p { color: red; }</style>
            <script type="text/javascript">var x = "<b>";</script></head>
            <body><h1>Title</h1>  <p>First
            paragraph</p><noscript>enable js</noscript></body></html>"#;
        assert_eq!(extract_text_from_html(html), "Title First paragraph");
    }

    #[test]
    fn strip_patterns_are_valid() {
        assert!(HIDDEN_BLOCKS.is_match("<SCRIPT src=\"a.js\">\n</SCRIPT>"));
        assert!(HIDDEN_BLOCKS.is_match("<noscript>x</noscript>"));
        assert!(TAGS.is_match("<br/>"));
        assert!(!TAGS.is_match("plain text"));
    }

    #[test]
    fn long_pages_are_truncated_with_ellipsis() {
        let text = "a".repeat(MAX_PAGE_CHARS + 1);
        let truncated = truncate_page(&text);
        assert_eq!(truncated.len(), MAX_PAGE_CHARS + 3);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_page("short"), "short");
    }

    #[test]
    fn results_are_formatted_in_sections() {
        let data: SerpApiResponse = serde_json::from_value(json!({
            "knowledge_graph": {
                "title": "Hanoi",
                "description": "Capital of Vietnam",
                "source": { "link": "https://example.org/hanoi" }
            },
            "answer_box": { "snippet": "About 8 million", "title": "Population" },
            "organic_results": [
                { "title": "One", "link": "https://one.example", "snippet": "first" },
                { "title": "No link" },
                { "title": "Three", "link": "https://three.example" }
            ]
        }))
        .expect("parse");

        let text = format_search_results(&data, "hanoi", 5);
        assert!(text.starts_with("Search results for \"hanoi\""));
        assert!(text.contains("**Hanoi**\nCapital of Vietnam"));
        assert!(text.contains("Source: https://example.org/hanoi"));
        assert!(text.contains("**Population**: About 8 million"));
        assert!(text.contains("1. **One**\n   first\n   Link: https://one.example"));
        assert!(text.contains("3. **Three**"));
        assert!(!text.contains("No link"));
    }

    #[test]
    fn empty_results_offer_fallback() {
        let text = format_search_results(&SerpApiResponse::default(), "zzz", 5);
        assert!(text.starts_with(
            "No results found for \"zzz\". Try: https://www.google.com/search?q=zzz"
        ));
    }

    #[tokio::test]
    async fn search_without_key_degrades_to_link() {
        let search = SerpApiSearch::new(reqwest::Client::new(), None);
        let text = search.search("rust", 5).await;
        assert!(text.contains("https://www.google.com/search?q=rust"));
    }

    #[tokio::test]
    async fn query_is_routed_to_search_with_capped_count() {
        let search = Arc::new(RecordingSearch::default());
        let tool = WebTool::new(reqwest::Client::new(), search.clone());

        let out = tool
            .execute(args(json!({"query": "rust", "num_results": 50})))
            .await
            .expect("search");
        assert_eq!(out, json!({"content": "results for rust"}));

        tool.execute(args(json!({"query": "tokio"})))
            .await
            .expect("search");

        let calls = search.calls.lock().expect("lock").clone();
        assert_eq!(
            calls,
            vec![("rust".to_string(), MAX_RESULTS), ("tokio".to_string(), DEFAULT_RESULTS)]
        );
    }

    #[tokio::test]
    async fn neither_query_nor_url_is_reported() {
        let tool = WebTool::new(reqwest::Client::new(), Arc::new(RecordingSearch::default()));
        let out = tool.execute(Map::new()).await.expect("result");
        assert_eq!(out, json!({"error": "Either query or url parameter is required"}));
    }

    #[tokio::test]
    async fn invalid_url_fails() {
        let tool = WebTool::new(reqwest::Client::new(), Arc::new(RecordingSearch::default()));
        let err = tool
            .execute(args(json!({"url": "not a url"})))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to execute web_search"));
    }
}
