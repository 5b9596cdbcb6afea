//! Embedding storage backends
//!
//! Two backends satisfy the same [`EmbeddingStore`] contract:
//! - [`MemoryStore`]: exact brute-force search, optionally snapshotted to a
//!   JSON file. Used for development, tests and small corpora.
//! - [`PgStore`]: Postgres with the pgvector extension and an HNSW index.
//!
//! Both also implement [`PortraitStore`](crate::portrait::PortraitStore).
//!
//! # Storage Model
//!
//! Each stored embedding consists of:
//! - the chunk text and the vector computed from it
//! - the portrait the chunk was cut from
//! - the splitter and embedder identities that produced it
//! - an optional experiment tag separating offline experiments from the
//!   main corpus
//!
//! Searches are always scoped to one splitter/embedder pair: vectors from
//! different strategies live in unrelated spaces.
//!
//! # Usage
//!
//! ```ignore
//! use portrait_search_lib::store::{EmbeddingStore, MemoryStore, VectorQuery};
//!
//! let store = MemoryStore::new();
//! store.insert_many(records).await?;
//!
//! let query = VectorQuery::new(&vector, splitter_type, embedder_type, DistanceType::Cosine, 30);
//! let results = store.vector_search(&query).await?;
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embed::{EmbedderType, Embedding};
use crate::portrait::PortraitId;
use crate::split::SplitterType;
use crate::{Error, Result};

/// Identifier of a stored embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingId(pub Uuid);

impl EmbeddingId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EmbeddingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EmbeddingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Distance metric used by vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceType {
    Cosine,
    #[serde(alias = "eucledian")]
    Euclidean,
    DotProduct,
}

impl DistanceType {
    pub const ALL: [DistanceType; 3] = [
        DistanceType::Cosine,
        DistanceType::Euclidean,
        DistanceType::DotProduct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot-product",
        }
    }

    /// Distance between two vectors; lower means closer.
    ///
    /// Matches pgvector's `<=>`, `<->` and `<#>` operators.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }

    /// Convert a distance into a similarity; higher means more relevant.
    pub fn similarity_from_distance(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance),
            Self::DotProduct => -distance,
        }
    }

    /// Similarity between two vectors under this metric.
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        self.similarity_from_distance(self.distance(a, b))
    }
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "eucledian" => Ok(Self::Euclidean),
            "dot-product" => Ok(Self::DotProduct),
            other => Err(Error::Config(format!("unknown distance type '{other}'"))),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// An embedding that has not been stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmbedding {
    pub portrait_id: PortraitId,
    pub embedding: Embedding,
    /// The chunk the vector was computed from
    pub embedded_text: String,
    pub splitter_type: SplitterType,
    pub embedder_type: EmbedderType,
    pub experiment: Option<String>,
}

impl NewEmbedding {
    pub(crate) fn with_id(self, id: EmbeddingId) -> EmbeddingRecord {
        EmbeddingRecord {
            id,
            portrait_id: self.portrait_id,
            embedding: self.embedding,
            embedded_text: self.embedded_text,
            splitter_type: self.splitter_type,
            embedder_type: self.embedder_type,
            experiment: self.experiment,
        }
    }
}

/// A stored chunk embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: EmbeddingId,
    pub portrait_id: PortraitId,
    pub embedding: Embedding,
    pub embedded_text: String,
    pub splitter_type: SplitterType,
    pub embedder_type: EmbedderType,
    #[serde(default)]
    pub experiment: Option<String>,
}

/// A search hit with similarity score
///
/// `query` and `query_text` are filled in by the retriever with the query
/// chunk that produced the hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingSimilarity {
    pub portrait_id: PortraitId,
    pub embedding: Embedding,
    pub embedded_text: String,
    /// Higher is more similar
    pub similarity: f32,
    pub query: Option<Embedding>,
    pub query_text: Option<String>,
}

/// Parameters of a scoped nearest-neighbour search.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    pub vector: &'a [f32],
    pub splitter_type: SplitterType,
    pub embedder_type: EmbedderType,
    pub distance: DistanceType,
    /// `None` searches only records without an experiment tag
    pub experiment: Option<&'a str>,
    pub limit: usize,
}

impl<'a> VectorQuery<'a> {
    pub fn new(
        vector: &'a [f32],
        splitter_type: SplitterType,
        embedder_type: EmbedderType,
        distance: DistanceType,
        limit: usize,
    ) -> Self {
        Self {
            vector,
            splitter_type,
            embedder_type,
            distance,
            experiment: None,
            limit,
        }
    }

    pub fn with_experiment(mut self, experiment: Option<&'a str>) -> Self {
        self.experiment = experiment;
        self
    }

    /// Whether a stored record falls inside this query's scope.
    pub fn matches(&self, record: &EmbeddingRecord) -> bool {
        record.splitter_type == self.splitter_type
            && record.embedder_type == self.embedder_type
            && record.experiment.as_deref() == self.experiment
    }
}

/// Trait for embedding storage backends
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Store new embeddings, assigning identifiers.
    ///
    /// Either every record is stored or none is.
    async fn insert_many(&self, records: Vec<NewEmbedding>) -> Result<Vec<EmbeddingRecord>>;

    /// All embeddings produced by one splitter/embedder pair, across experiments.
    async fn get_by_type(
        &self,
        splitter_type: SplitterType,
        embedder_type: EmbedderType,
    ) -> Result<Vec<EmbeddingRecord>>;

    /// Nearest neighbours of `query.vector` within the query's scope.
    ///
    /// Returns at most `query.limit` results sorted by similarity (highest first).
    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<EmbeddingSimilarity>>;

    /// Delete one embedding. Returns true if it existed.
    async fn delete(&self, id: EmbeddingId) -> Result<bool>;

    /// Total number of stored embeddings
    async fn count(&self) -> Result<usize>;
}

mod memory;
mod postgres;

pub use memory::*;
pub use postgres::*;
