use super::{extract_string_arg, extract_usize_arg_opt, http_client};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 10;

/// Web search through DuckDuckGo's HTML endpoint. No API key needed.
pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns results with titles, snippets and URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let query = extract_string_arg(&args, "query")?;
        let limit = extract_usize_arg_opt(&args, "max_results", 5).clamp(1, MAX_RESULTS);

        let response = match self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::error(format!("Search request failed: {e}"))),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::error(format!("Search failed with HTTP {status}")));
        }

        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read search results: {e}"))),
        };

        let results = extract_results(&html, limit);
        tracing::debug!(query = %query, results = results.len(), "web search finished");

        if results.is_empty() {
            Ok(ToolResult::success(format!("No results found for: {query}")))
        } else {
            Ok(ToolResult::success(
                results
                    .iter()
                    .map(SearchHit::render)
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SearchHit {
    title: String,
    snippet: String,
    url: String,
}

impl SearchHit {
    fn render(&self) -> String {
        format!("**{}**\n{}\nURL: {}", self.title, self.snippet, self.url)
    }
}

fn field_text<'a>(chunk: &'a str, class: &str) -> Option<&'a str> {
    chunk
        .split(&format!("class=\"{class}\""))
        .nth(1)
        .and_then(|s| s.split_once('>'))
        .and_then(|(_, rest)| rest.split('<').next())
        .map(str::trim)
}

fn extract_results(html: &str, limit: usize) -> Vec<SearchHit> {
    html.split("class=\"result__body\"")
        .skip(1)
        .filter_map(|chunk| {
            let title = field_text(chunk, "result__a").filter(|t| !t.is_empty())?;
            Some(SearchHit {
                title: html_decode(title),
                snippet: html_decode(field_text(chunk, "result__snippet").unwrap_or_default()),
                url: field_text(chunk, "result__url").unwrap_or_default().to_string(),
            })
        })
        .take(limit)
        .collect()
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}
