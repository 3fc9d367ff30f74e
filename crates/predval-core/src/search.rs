//! Search Adapter and fan-out: a thin reqwest client over a generic web-search endpoint (§4.15),
//! plus the "issue N queries in parallel, concatenate preserving order" fan-out of §4.5.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::SearchResult;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Option<Vec<OrganicResult>>,
}

/// The web-search endpoint, per SPEC_FULL.md §6.
#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    /// Run one query, asking for at most `num` results. Absence of `organic_results` in the
    /// provider's response is treated as an empty list, never an error.
    async fn search(&self, query: &str, num: u32) -> Result<Vec<SearchResult>>;
}

/// HTTP implementation of `SearchClient`.
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    api_key: String,
}

impl HttpSearchClient {
    /// Build a new client. `http` is expected to be shared process-wide (cheaply cloneable).
    pub fn new(http: reqwest::Client, base_url: reqwest::Url, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, query: &str, num: u32) -> Result<Vec<SearchResult>> {
        let capped = num.min(10);
        let body = SearchRequest {
            q: query,
            num: capped,
            api_key: &self.api_key,
        };

        let res = self
            .http
            .get(self.base_url.clone())
            .query(&body)
            .send()
            .await
            .map_err(|err| Error::Search(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(Error::Search(format!("HTTP {status}: {detail}")));
        }

        let parsed: SearchResponse = res
            .json()
            .await
            .map_err(|err| Error::Search(format!("malformed search response: {err}")))?;

        Ok(parsed
            .organic_results
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                url: r.link,
                title: r.title,
                excerpt: r.snippet,
                pub_date: r.date,
            })
            .collect())
    }
}

/// Run `queries` against `client` in parallel (all issued together, all awaited together), each
/// capped at `results_per_query`, and concatenate the results preserving per-query order and
/// the order of `queries`. A query returning zero results is tolerated (empty contribution); a
/// query that errors (network failure, non-2xx, malformed body) propagates that error, per §7
/// ("Adapter exception (LLM/search) → Outcome Invalid") — the same treatment `pipeline.rs` gives
/// a failed chat-adapter call.
pub async fn fan_out(
    client: &dyn SearchClient,
    queries: &[String],
    results_per_query: u32,
) -> Result<Vec<SearchResult>> {
    let futures = queries
        .iter()
        .map(|q| async move { client.search(q, results_per_query).await });

    let mut combined = Vec::new();
    for result in futures::future::join_all(futures).await {
        combined.extend(result?);
    }
    Ok(combined)
}
