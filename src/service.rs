//! The RAG query pipeline: retrieve pages, widen them with neighbours,
//! and answer from the page images.

use crate::config::{Config, RagConfig};
use crate::corpus::PageStore;
use crate::error::{RagError, Result};
use crate::generator::{AnswerGenerator, VisionGenerator};
use crate::pages::{PageRef, expand_with_overlap};
use crate::retrieval::{HttpEmbedder, QdrantStore, Retriever, VectorRetriever};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDetails {
    pub answer: String,
    /// Pages returned by retrieval, best first. Retrieval metrics use these.
    pub retrieved_pages: Vec<PageRef>,
    /// Pages shown to the generator after overlap expansion.
    pub expanded_pages: Vec<PageRef>,
}

/// Per-query overrides of [`RagConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub max_new_tokens: Option<u32>,
    pub pages_before: Option<u32>,
    pub pages_after: Option<u32>,
}

/// Anything that answers a question and reports the pages it used.
#[async_trait]
pub trait RagQuery: Send + Sync {
    async fn query_with_details(&self, question: &str) -> Result<QueryDetails>;

    /// Settings recorded in evaluation reports, if known.
    fn rag_config(&self) -> Option<&RagConfig> {
        None
    }
}

pub struct RagService<R, G> {
    retriever: R,
    generator: G,
    corpus: PageStore,
    config: RagConfig,
}

impl<R: Retriever, G: AnswerGenerator> RagService<R, G> {
    pub fn new(retriever: R, generator: G, corpus: PageStore, config: RagConfig) -> Self {
        Self {
            retriever,
            generator,
            corpus,
            config,
        }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    pub fn retriever_mut(&mut self) -> &mut R {
        &mut self.retriever
    }

    pub fn corpus(&self) -> &PageStore {
        &self.corpus
    }

    pub fn corpus_mut(&mut self) -> &mut PageStore {
        &mut self.corpus
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn is_indexed(&self) -> bool {
        self.retriever.is_indexed()
    }

    /// Rescan the corpus and index it. Returns the number of pages indexed.
    pub async fn index_documents(&mut self, overwrite: bool) -> Result<usize> {
        let documents = self.corpus.load()?;
        if documents == 0 {
            tracing::warn!(root = %self.corpus.root().display(), "no supported files to index");
            return Ok(0);
        }
        tracing::info!(
            documents,
            pages = self.corpus.total_pages(),
            overwrite,
            "indexing corpus"
        );
        self.retriever.index(&self.corpus, overwrite).await
    }

    /// Answer a question with per-query overrides.
    pub async fn query_with_details_opts(
        &self,
        question: &str,
        options: QueryOptions,
    ) -> Result<QueryDetails> {
        if !self.retriever.is_indexed() {
            return Err(RagError::NotIndexed);
        }

        let top_k = options.top_k.unwrap_or(self.config.default_top_k);
        let max_new_tokens = options
            .max_new_tokens
            .unwrap_or(self.config.default_max_new_tokens);
        let pages_before = options.pages_before.unwrap_or(self.config.pages_before);
        let pages_after = options.pages_after.unwrap_or(self.config.pages_after);

        let hits = self.retriever.search(question, top_k).await?;
        let retrieved_pages: Vec<PageRef> = hits.iter().map(|hit| hit.page).collect();
        let expanded_pages = expand_with_overlap(&hits, pages_before, pages_after, &self.corpus);

        tracing::debug!(
            retrieved = retrieved_pages.len(),
            expanded = expanded_pages.len(),
            "pages selected"
        );

        let images = self.corpus.pages_for(&expanded_pages);
        let answer = self
            .generator
            .generate(&images, question, max_new_tokens)
            .await?;

        Ok(QueryDetails {
            answer,
            retrieved_pages,
            expanded_pages,
        })
    }

    /// Answer a question and return only the text.
    pub async fn query(&self, question: &str) -> Result<String> {
        let details = self
            .query_with_details_opts(question, QueryOptions::default())
            .await?;
        Ok(details.answer)
    }
}

/// Service wired to the HTTP embedder, Qdrant and the vision model.
pub type DefaultRagService = RagService<VectorRetriever<HttpEmbedder>, VisionGenerator>;

impl DefaultRagService {
    /// Connect every backend named in `config` and load the page corpus.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = HttpEmbedder::new(&config.embedder)?;
        let mut retriever = VectorRetriever::new(embedder, QdrantStore::new(&config.qdrant));
        retriever.initialize().await?;

        let mut corpus = PageStore::from_config(&config.storage);
        corpus.load()?;

        Ok(RagService::new(
            retriever,
            VisionGenerator::new(config.llm.clone()),
            corpus,
            config.rag.clone(),
        ))
    }
}

#[async_trait]
impl<R: Retriever, G: AnswerGenerator> RagQuery for RagService<R, G> {
    async fn query_with_details(&self, question: &str) -> Result<QueryDetails> {
        self.query_with_details_opts(question, QueryOptions::default())
            .await
    }

    fn rag_config(&self) -> Option<&RagConfig> {
        Some(&self.config)
    }
}
