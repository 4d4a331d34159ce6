//! Retriever over a Qdrant collection of page embeddings.

use super::{Embedder, PagePoint, QdrantStore, Retriever};
use crate::corpus::PageStore;
use crate::error::{RagError, Result};
use crate::pages::RetrievalHit;
use async_trait::async_trait;

/// Pages sent to the embedder per request.
const EMBED_BATCH_SIZE: usize = 4;

pub struct VectorRetriever<E> {
    embedder: E,
    store: QdrantStore,
    indexed: bool,
}

impl<E: Embedder> VectorRetriever<E> {
    /// Create a retriever. Call [`VectorRetriever::initialize`] to pick up an
    /// index built by a previous run.
    pub fn new(embedder: E, store: QdrantStore) -> Self {
        Self {
            embedder,
            store,
            indexed: false,
        }
    }

    /// Probe the collection and mark the retriever indexed if it holds points.
    pub async fn initialize(&mut self) -> Result<u64> {
        let count = self.store.point_count().await?;
        self.indexed = count > 0;
        tracing::info!(
            collection = self.store.collection(),
            points = count,
            "vector store ready"
        );
        Ok(count)
    }

    pub fn store(&self) -> &QdrantStore {
        &self.store
    }
}

#[async_trait]
impl<E: Embedder> Retriever for VectorRetriever<E> {
    fn is_indexed(&self) -> bool {
        self.indexed
    }

    async fn index(&mut self, corpus: &PageStore, overwrite: bool) -> Result<usize> {
        if overwrite {
            self.store.delete_collection().await?;
            self.indexed = false;
        } else if self.store.point_count().await? > 0 {
            tracing::info!("index already populated, skipping (use overwrite to rebuild)");
            self.indexed = true;
            return Ok(0);
        }

        self.store.ensure_collection().await?;

        let mut next_id = 0u64;
        for doc in corpus.documents() {
            let pages = corpus.document_pages(doc.doc_id);
            for batch in pages.chunks(EMBED_BATCH_SIZE) {
                let embeddings = self.embedder.embed_images(batch).await?;
                let points: Vec<PagePoint> = batch
                    .iter()
                    .zip(embeddings)
                    .map(|(image, vector)| {
                        let id = next_id;
                        next_id += 1;
                        PagePoint::new(id, image.page.doc_id, image.page.page_num, vector)
                    })
                    .collect();
                self.store.upsert(&points).await?;
            }
            tracing::info!(
                doc_id = doc.doc_id,
                name = %doc.name,
                pages = pages.len(),
                "indexed document"
            );
        }

        let indexed = usize::try_from(next_id).unwrap_or(usize::MAX);
        self.indexed = indexed > 0;
        Ok(indexed)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        if !self.indexed {
            return Err(RagError::NotIndexed);
        }
        let vector = self.embedder.embed_query(query).await?;
        self.store.query(&vector, k).await
    }
}
