//! ColPali RAG - question answering over document page images.
//!
//! Documents are stored as page images. Each page is embedded as a
//! late-interaction multi-vector and retrieved with MaxSim scoring; the
//! retrieved pages are widened with their neighbours and handed, as images,
//! to a vision-language model that writes the answer.
//!
//! The [`eval`] module scores the whole pipeline against a test dataset with
//! an LLM judge and page-level retrieval metrics.
//!
//! # Quick Start
//!
//! ```no_run
//! use colpali_rag::{
//!     config::Config,
//!     corpus::PageStore,
//!     generator::VisionGenerator,
//!     retrieval::{HttpEmbedder, QdrantStore, VectorRetriever},
//!     service::{RagQuery, RagService},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let embedder = HttpEmbedder::new(&config.embedder)?;
//!     let mut retriever = VectorRetriever::new(embedder, QdrantStore::new(&config.qdrant));
//!     retriever.initialize().await?;
//!
//!     let mut corpus = PageStore::from_config(&config.storage);
//!     corpus.load()?;
//!
//!     let generator = VisionGenerator::new(config.llm.clone());
//!     let service = RagService::new(retriever, generator, corpus, config.rag.clone());
//!
//!     let details = service.query_with_details("How do I reset the device?").await?;
//!     println!("{}", details.answer);
//!     for page in &details.expanded_pages {
//!         println!("  {}", page);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **PageStore**: page images on disk, grouped by document
//! - **Retriever**: multi-vector page search (HTTP embedder + Qdrant)
//! - **expand_with_overlap**: adds neighbouring pages to each hit
//! - **AnswerGenerator**: vision-language answer from page images
//! - **RagService**: the query pipeline
//! - **Evaluator**: dataset evaluation with checkpoints and reports

pub mod config;
pub mod corpus;
pub mod error;
pub mod eval;
pub mod generator;
pub mod llm;
pub mod pages;
pub mod persistence;
pub mod retrieval;
pub mod service;

// Re-export commonly used types
pub use config::Config;
pub use corpus::{DocumentSource, PageImage, PageStore};
pub use error::{EvalStage, RagError, Result};
pub use generator::{AnswerGenerator, VisionGenerator};
pub use llm::LlmClient;
pub use pages::{PageInventory, PageRef, RetrievalHit, expand_with_overlap};
pub use retrieval::{Embedder, HttpEmbedder, QdrantStore, Retriever, VectorRetriever};
pub use service::{DefaultRagService, QueryDetails, QueryOptions, RagQuery, RagService};
