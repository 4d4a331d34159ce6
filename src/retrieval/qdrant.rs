//! Qdrant collection of page multi-vectors, spoken to over its REST API.

use super::MultiVector;
use crate::config::QdrantConfig;
use crate::error::{RagError, Result};
use crate::pages::RetrievalHit;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One indexed page.
#[derive(Debug, Clone, Serialize)]
pub struct PagePoint {
    pub id: u64,
    pub vector: MultiVector,
    pub payload: PagePayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PagePayload {
    pub doc_id: u32,
    pub page_num: u32,
}

impl PagePoint {
    pub fn new(id: u64, doc_id: u32, page_num: u32, vector: MultiVector) -> Self {
        Self {
            id,
            vector,
            payload: PagePayload { doc_id, page_num },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<PagePayload>,
}

/// Handle to a single Qdrant collection.
#[derive(Clone)]
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(config: &QdrantConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection_name.clone(),
            vector_size: config.vector_size,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, String)> {
        let mut request = self.client.request(method, self.url(suffix));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let (status, text) = self.send(method, suffix, body).await?;
        if !status.is_success() {
            return Err(RagError::VectorStore(format!(
                "{} on collection '{}': {}",
                status, self.collection, text
            )));
        }
        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        Ok(envelope.result)
    }

    pub async fn collection_exists(&self) -> Result<bool> {
        let (status, text) = self.send(Method::GET, "", None).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(RagError::VectorStore(format!("{}: {}", s, text))),
        }
    }

    /// Create the collection with MaxSim multi-vector scoring if it is missing.
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine",
                "multivector_config": { "comparator": "max_sim" }
            }
        });
        let _: Value = self.call(Method::PUT, "", Some(body)).await?;
        tracing::info!(collection = %self.collection, "created collection");
        Ok(())
    }

    pub async fn delete_collection(&self) -> Result<()> {
        if !self.collection_exists().await? {
            return Ok(());
        }
        let _: Value = self.call(Method::DELETE, "", None).await?;
        tracing::info!(collection = %self.collection, "deleted collection");
        Ok(())
    }

    /// Number of stored points; zero when the collection does not exist.
    pub async fn point_count(&self) -> Result<u64> {
        if !self.collection_exists().await? {
            return Ok(0);
        }
        let count: CountResult = self
            .call(Method::POST, "/points/count", Some(json!({ "exact": true })))
            .await?;
        Ok(count.count)
    }

    pub async fn upsert(&self, points: &[PagePoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": points });
        let _: Value = self.call(Method::PUT, "/points?wait=true", Some(body)).await?;
        Ok(())
    }

    /// Top `limit` pages by MaxSim score. Points without a page payload are dropped.
    pub async fn query(&self, vector: &[Vec<f32>], limit: usize) -> Result<Vec<RetrievalHit>> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true
        });
        let result: QueryResult = self.call(Method::POST, "/points/query", Some(body)).await?;

        Ok(result
            .points
            .into_iter()
            .filter_map(|point| {
                point
                    .payload
                    .map(|p| RetrievalHit::new(p.doc_id, p.page_num, point.score))
            })
            .collect())
    }
}
