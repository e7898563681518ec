//! Elasticsearch-backed [`DocumentStore`] implementation.
//!
//! Talks to the REST API directly with `reqwest`. The document id is the
//! filename, so `PUT /{index}/_doc/{filename}` is an upsert.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{DocumentSummary, IndexedDocument, SearchHit};

use super::DocumentStore;

pub struct ElasticStore {
    client: Client,
    base: Url,
    index: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: Option<HitSource>,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "_source")]
    source: IndexedDocument,
}

impl ElasticStore {
    pub fn new(base_url: &str, index: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid elasticsearch url: {}", base_url))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base,
            index: index.to_string(),
        })
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("elasticsearch url cannot be a base: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn run_search(&self, body: Value) -> Result<SearchResponse> {
        let resp = self
            .client
            .post(self.url(&[self.index.as_str(), "_search"])?)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("search failed with {}: {}", status, resp.text().await?);
        }
        Ok(resp.json().await?)
    }
}

/// `match` query on `content`, returning only filenames, like the search API.
pub fn search_body(query: &str, limit: usize) -> Value {
    json!({
        "query": { "match": { "content": query } },
        "_source": ["filename"],
        "size": limit,
    })
}

pub fn list_body(limit: usize) -> Value {
    json!({
        "query": { "match_all": {} },
        "_source": ["filename"],
        "size": limit,
        "sort": [{ "_doc": "asc" }],
    })
}

fn hits_to_results(resp: SearchResponse) -> Vec<SearchHit> {
    resp.hits
        .hits
        .into_iter()
        .filter_map(|h| {
            Some(SearchHit {
                filename: h.source?.filename?,
                score: h.score.unwrap_or(0.0),
            })
        })
        .collect()
}

#[async_trait]
impl DocumentStore for ElasticStore {
    async fn ping(&self) -> Result<()> {
        let resp = self.client.get(self.base.clone()).send().await?;
        if !resp.status().is_success() {
            bail!("elasticsearch responded {}", resp.status());
        }
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool> {
        let resp = self.client.head(self.url(&[self.index.as_str()])?).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => bail!("index check for '{}' returned {}", self.index, other),
        }
    }

    async fn create_index(&self) -> Result<()> {
        let resp = self.client.put(self.url(&[self.index.as_str()])?).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!(
                "creating index '{}' failed with {}: {}",
                self.index,
                status,
                resp.text().await?
            );
        }
        Ok(())
    }

    async fn upsert(&self, doc: &IndexedDocument) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&[self.index.as_str(), "_doc", doc.filename.as_str()])?)
            .json(doc)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            bail!(
                "indexing '{}' failed with {}: {}",
                doc.filename,
                status,
                resp.text().await?
            );
        }
        Ok(())
    }

    async fn get(&self, filename: &str) -> Result<Option<IndexedDocument>> {
        let resp = self
            .client
            .get(self.url(&[self.index.as_str(), "_doc", filename])?)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body: GetResponse = resp.json().await?;
                Ok(Some(body.source))
            }
            other => bail!("fetching '{}' returned {}", filename, other),
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let resp = self.run_search(search_body(query, limit)).await?;
        Ok(hits_to_results(resp))
    }

    async fn list(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let resp = self.run_search(list_body(limit)).await?;
        Ok(hits_to_results(resp)
            .into_iter()
            .map(|h| DocumentSummary {
                filename: h.filename,
            })
            .collect())
    }
}
