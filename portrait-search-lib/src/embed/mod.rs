//! Text embedding using local models
//!
//! Uses sentence-embedding models via the fastembed crate (ONNX runtime).
//! Every embedder carries an [`EmbedderType`] identity that is persisted next
//! to the vectors it produced.
//!
//! # Dimensionality
//!
//! An embedder may be configured with a target dimensionality so that
//! vectors from different models fit one storage column. Smaller natural
//! outputs are zero-padded on the right. A target smaller than the natural
//! output is rejected: truncating would change the geometry of the space.
//!
//! # Usage
//!
//! ```ignore
//! use portrait_search_lib::embed::{Embedder, EmbedderType, FastEmbedder};
//!
//! let embedder = FastEmbedder::new(EmbedderType::AllMiniLmL6V2, Some(768))?;
//! let vectors = embedder.embed(&["a female elf druid".to_string()])?;
//! assert_eq!(vectors[0].len(), 768);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Identity of an embedding model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmbedderType {
    #[serde(rename = "all-MiniLM-L6-v2")]
    AllMiniLmL6V2,
    #[serde(rename = "bge-small-en-v1.5")]
    BgeSmallEnV15,
    #[serde(rename = "bge-base-en-v1.5")]
    BgeBaseEnV15,
    #[serde(rename = "nomic-embed-text-v1.5")]
    NomicEmbedTextV15,
}

impl EmbedderType {
    pub const ALL: [EmbedderType; 4] = [
        EmbedderType::AllMiniLmL6V2,
        EmbedderType::BgeSmallEnV15,
        EmbedderType::BgeBaseEnV15,
        EmbedderType::NomicEmbedTextV15,
    ];

    /// Persisted identity token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "bge-base-en-v1.5",
            Self::NomicEmbedTextV15 => "nomic-embed-text-v1.5",
        }
    }

    /// Output dimensionality of the underlying model.
    pub fn natural_dimension(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 | Self::NomicEmbedTextV15 => 768,
        }
    }
}

impl fmt::Display for EmbedderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbedderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown embedder type '{s}'")))
    }
}

/// Trait for text embedding models
pub trait Embedder: Send + Sync {
    /// Embed a batch of chunks.
    ///
    /// Returns one vector per chunk, in input order, all of length
    /// [`dimension`](Self::dimension).
    fn embed(&self, chunks: &[String]) -> Result<Vec<Embedding>>;

    /// Identity used to scope stored embeddings
    fn embedder_type(&self) -> EmbedderType;

    /// Length of every returned vector
    fn dimension(&self) -> usize;
}

/// Resolve the output dimension for a model with the given natural size.
pub fn resolve_dimension(natural: usize, target: Option<usize>) -> Result<usize> {
    match target {
        None => Ok(natural),
        Some(target) if target >= natural => Ok(target),
        Some(target) => Err(Error::Config(format!(
            "embedding dimension {natural} cannot be reduced to {target}"
        ))),
    }
}

/// Zero-pad `embedding` on the right up to `target` coordinates.
pub fn pad_embedding(mut embedding: Embedding, target: usize) -> Result<Embedding> {
    if embedding.len() > target {
        return Err(Error::Config(format!(
            "embedding of dimension {} exceeds target dimension {target}",
            embedding.len()
        )));
    }
    embedding.resize(target, 0.0);
    Ok(embedding)
}

mod onnx;
pub use onnx::*;
