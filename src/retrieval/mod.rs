//! Page retrieval over multi-vector (late-interaction) page embeddings.
//!
//! An [`Embedder`] turns questions and page images into multi-vectors, a
//! [`QdrantStore`] holds one point per page scored with MaxSim, and the
//! [`VectorRetriever`] ties both to the page corpus.

mod embedder;
mod qdrant;
mod vector;

pub use embedder::HttpEmbedder;
pub use qdrant::{PagePoint, QdrantStore};
pub use vector::VectorRetriever;

use crate::corpus::{PageImage, PageStore};
use crate::error::Result;
use crate::pages::RetrievalHit;
use async_trait::async_trait;

/// One embedding vector per token or image patch.
pub type MultiVector = Vec<Vec<f32>>;

/// Produces late-interaction embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<MultiVector>;

    /// One multi-vector per image, in input order.
    async fn embed_images(&self, images: &[PageImage]) -> Result<Vec<MultiVector>>;
}

/// Finds the pages most relevant to a question.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Whether at least one page has been indexed.
    fn is_indexed(&self) -> bool;

    /// Index every page of the corpus. Returns the number of pages indexed.
    ///
    /// Without `overwrite`, an already populated index is left untouched.
    async fn index(&mut self, corpus: &PageStore, overwrite: bool) -> Result<usize>;

    /// Top `k` pages for the question, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>>;
}
