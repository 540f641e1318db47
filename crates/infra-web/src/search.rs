use async_trait::async_trait;
use penny_domain::{SearchPort, SearchResult};
use penny_error::AgentError;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const SEARCH_URL: &str = "https://api.perplexity.ai/search";
const MAX_RESULTS: u32 = 10;

pub struct PerplexityConfig {
    pub api_key: String,
}

pub struct PerplexityAdapter {
    config: PerplexityConfig,
    client: Client,
}

impl PerplexityAdapter {
    pub fn new(config: PerplexityConfig) -> Self {
        let client = Client::new();
        Self { config, client }
    }
}

#[async_trait]
impl SearchPort for PerplexityAdapter {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::invalid_input("query cannot be empty"));
        }

        debug!(url = SEARCH_URL, "perplexity POST");
        let resp = self
            .client
            .post(SEARCH_URL)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({ "query": query, "max_results": MAX_RESULTS }))
            .send()
            .await
            .map_err(|e| AgentError::network(format!("perplexity request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AgentError::auth("perplexity rejected the API key"));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::api(format!(
                "perplexity HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AgentError::api(format!("perplexity: invalid response: {e}")))?;
        let results = parse_results(&body);
        debug!(count = results.len(), "web search");
        Ok(results)
    }
}

/// Ranked `results` of a search response; entries without a URL are dropped.
fn parse_results(body: &Value) -> Vec<SearchResult> {
    body["results"]
        .as_array()
        .map_or(&[] as &[Value], |v| v)
        .iter()
        .filter_map(|r| {
            let url = r["url"].as_str().filter(|u| !u.is_empty())?;
            Some(SearchResult {
                title: r["title"].as_str().unwrap_or(url).to_string(),
                url: url.to_string(),
                snippet: r["snippet"].as_str().unwrap_or("").trim().to_string(),
                date: r["date"]
                    .as_str()
                    .or(r["last_updated"].as_str())
                    .map(|s| s.to_string()),
            })
        })
        .collect()
}
