//! Portrait search - text retrieval over described character portraits
//!
//! # Architecture
//!
//! ```text
//! Portrait.description -> Splitter -> Embedder -> EmbeddingStore
//!                                                      |
//! Query -> Splitter::split_query -> Embedder -> vector_search (per chunk)
//!                                                      |
//!                                   mean per portrait -> top k -> PortraitStore
//!
//! Dataset -> Judge -> Retriever -> Metrics
//! ```
//!
//! # Example
//!
//! ```ignore
//! use portrait_search_lib::config::Settings;
//! use portrait_search_lib::index::generate_embeddings;
//! use portrait_search_lib::retrieve::Retriever;
//!
//! let settings = Settings::default();
//! let backend = settings.open_backend().await?;
//!
//! // Index every portrait not embedded yet
//! let embedder = settings.embedder()?;
//! generate_embeddings(&*backend.portraits(), &*backend.embeddings(), &settings.splitter(), &embedder, None).await?;
//!
//! // Search
//! let retriever = settings.retriever(&backend)?;
//! let retrieval = retriever.get_portraits("dwarf cleric with a warhammer", None, 10).await?;
//! ```

pub mod config;
pub mod embed;
pub mod error;
pub mod index;
pub mod portrait;
pub mod quality;
pub mod retrieve;
pub mod split;
pub mod store;

pub use error::{Error, Result};
