//! Client for a multi-vector embedding server.
//!
//! The server exposes `POST /embed/query` with `{"text": ...}` and
//! `POST /embed/images` with `{"images": [<base64>, ...]}`; both answer
//! `{"embeddings": ...}`.

use super::{Embedder, MultiVector};
use crate::config::EmbedderConfig;
use crate::corpus::PageImage;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImagesRequest {
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse<T> {
    embeddings: T,
}

/// Embedder backed by an HTTP service.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RagError::Http(format!(
                "Embedding server error ({}): {}",
                status, text
            )));
        }

        let parsed: EmbeddingResponse<T> = serde_json::from_str(&text)?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_query(&self, text: &str) -> Result<MultiVector> {
        self.post("/embed/query", &QueryRequest { text }).await
    }

    async fn embed_images(&self, images: &[PageImage]) -> Result<Vec<MultiVector>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = images
            .iter()
            .map(|image| image.read_bytes().map(|bytes| BASE64.encode(bytes)))
            .collect::<Result<Vec<_>>>()?;

        let embeddings: Vec<MultiVector> = self
            .post("/embed/images", &ImagesRequest { images: encoded })
            .await?;

        if embeddings.len() != images.len() {
            return Err(RagError::Serialization(format!(
                "Expected {} image embeddings, got {}",
                images.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}
