//! Portrait retrieval
//!
//! Combines splitter, embedder and stores into a query API that ranks whole
//! portraits rather than individual chunks.
//!
//! # Algorithm
//!
//! ```text
//! query -> split_query -> [chunk] -> embed -> [vector]
//!                                              |
//!            vector_search (limit * 3) per chunk, concurrently
//!                                              |
//!                 pool hits -> group by portrait -> mean similarity
//!                                              |
//!                         top `limit` portraits -> resolve records
//! ```
//!
//! A portrait surfaced by only some query chunks is scored on the hits it
//! has; it is not penalised for missing from the other chunks' candidates.
//!
//! # Usage
//!
//! ```ignore
//! use portrait_search_lib::retrieve::{Retriever, SimilarityRetriever};
//!
//! let retriever = SimilarityRetriever::new(splitter, embedder, store.clone(), store, DistanceType::Euclidean);
//! let retrieval = retriever.get_portraits("elf ranger with a bow", None, 10).await?;
//! for (portrait, evidence) in retrieval.portraits.iter().zip(&retrieval.evidence) {
//!     println!("{} ({} supporting chunks)", portrait.fulllength_path, evidence.len());
//! }
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use tracing::{debug, instrument, warn};

use crate::embed::Embedder;
use crate::portrait::{PortraitId, PortraitRecord, PortraitStore};
use crate::split::Splitter;
use crate::store::{DistanceType, EmbeddingSimilarity, EmbeddingStore, VectorQuery};
use crate::{Error, Result};

/// Default number of portraits returned by a query
pub const DEFAULT_LIMIT: usize = 10;

/// Candidates fetched per query chunk, as a multiple of the requested limit.
///
/// A portrait that is the best match overall can be mediocre under a single
/// chunk; over-fetching keeps it in the pool until aggregation.
pub const CANDIDATE_MULTIPLIER: usize = 3;

/// Ranked portraits with the chunk hits that support each of them.
///
/// `portraits`, `scores` and `evidence` are parallel.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub portraits: Vec<PortraitRecord>,
    /// Mean similarity of each portrait
    pub scores: Vec<f32>,
    /// Hits that contributed to each portrait's score, in pooling order
    pub evidence: Vec<Vec<EmbeddingSimilarity>>,
}

/// Anything that can answer "which portraits match this text".
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn get_portraits(
        &self,
        query: &str,
        experiment: Option<&str>,
        limit: usize,
    ) -> Result<Retrieval>;
}

/// A portrait with its aggregated score before the record is resolved.
#[derive(Debug, Clone)]
pub struct ScoredPortrait {
    pub portrait_id: PortraitId,
    pub score: f32,
    pub evidence: Vec<EmbeddingSimilarity>,
}

/// Group pooled hits by portrait and keep the `limit` best mean scores.
///
/// Portraits with equal means keep the order in which they first appear in
/// `pooled`.
pub fn rank_portraits(pooled: Vec<EmbeddingSimilarity>, limit: usize) -> Vec<ScoredPortrait> {
    let mut order = Vec::new();
    let mut groups: HashMap<PortraitId, Vec<EmbeddingSimilarity>> = HashMap::new();
    for hit in pooled {
        groups
            .entry(hit.portrait_id)
            .or_insert_with(|| {
                order.push(hit.portrait_id);
                Vec::new()
            })
            .push(hit);
    }

    let mut scored: Vec<ScoredPortrait> = order
        .into_iter()
        .filter_map(|portrait_id| {
            let evidence = groups.remove(&portrait_id)?;
            let score =
                evidence.iter().map(|h| h.similarity).sum::<f32>() / evidence.len() as f32;
            Some(ScoredPortrait {
                portrait_id,
                score,
                evidence,
            })
        })
        .collect();

    // stable, so ties stay in first-seen order
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Retriever ranking portraits by mean chunk similarity.
pub struct SimilarityRetriever<S: Splitter, E: Embedder> {
    splitter: S,
    embedder: Arc<E>,
    embeddings: Arc<dyn EmbeddingStore>,
    portraits: Arc<dyn PortraitStore>,
    distance: DistanceType,
}

impl<S: Splitter, E: Embedder + 'static> SimilarityRetriever<S, E> {
    #[must_use]
    pub fn new(
        splitter: S,
        embedder: E,
        embeddings: Arc<dyn EmbeddingStore>,
        portraits: Arc<dyn PortraitStore>,
        distance: DistanceType,
    ) -> Self {
        Self {
            splitter,
            embedder: Arc::new(embedder),
            embeddings,
            portraits,
            distance,
        }
    }

    /// Returns a reference to the embedder.
    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Split and embed a query, pairing every chunk with its vector.
    ///
    /// Inference runs on the blocking pool.
    async fn embed_query(&self, query: &str) -> Result<Vec<(String, Vec<f32>)>> {
        let chunks = self.splitter.split_query(query);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let batch = chunks.clone();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed(&batch))
            .await
            .map_err(|err| Error::Embedding(format!("embedding task failed: {err}")))??;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} query chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        Ok(chunks.into_iter().zip(vectors).collect())
    }

    /// Search every query chunk and pool the tagged hits, in chunk order.
    async fn pooled_hits(
        &self,
        chunks: &[(String, Vec<f32>)],
        experiment: Option<&str>,
        candidates: usize,
    ) -> Result<Vec<EmbeddingSimilarity>> {
        let splitter_type = self.splitter.splitter_type();
        let embedder_type = self.embedder.embedder_type();

        let searches = chunks.iter().map(|(text, vector)| async move {
            let query = VectorQuery::new(
                vector,
                splitter_type,
                embedder_type,
                self.distance,
                candidates,
            )
            .with_experiment(experiment);
            let hits = self.embeddings.vector_search(&query).await?;
            debug!(chunk = %text, hits = hits.len(), "searched query chunk");

            Ok::<_, Error>(
                hits.into_iter()
                    .map(|mut hit| {
                        hit.query = Some(vector.clone());
                        hit.query_text = Some(text.clone());
                        hit
                    })
                    .collect::<Vec<_>>(),
            )
        });

        Ok(try_join_all(searches).await?.into_iter().flatten().collect())
    }
}

#[async_trait]
impl<S: Splitter, E: Embedder + 'static> Retriever for SimilarityRetriever<S, E> {
    #[instrument(skip(self), fields(splitter = %self.splitter.splitter_type(), embedder = %self.embedder.embedder_type()))]
    async fn get_portraits(
        &self,
        query: &str,
        experiment: Option<&str>,
        limit: usize,
    ) -> Result<Retrieval> {
        if limit == 0 {
            return Ok(Retrieval::default());
        }

        let chunks = self.embed_query(query).await?;
        if chunks.is_empty() {
            warn!("query produced no chunks");
            return Ok(Retrieval::default());
        }

        let pooled = self
            .pooled_hits(&chunks, experiment, limit.saturating_mul(CANDIDATE_MULTIPLIER))
            .await?;
        let ranked = rank_portraits(pooled, limit);
        debug!(chunks = chunks.len(), ranked = ranked.len(), "aggregated hits");

        let mut retrieval = Retrieval::default();
        for scored in ranked {
            retrieval
                .portraits
                .push(self.portraits.get_one(scored.portrait_id).await?);
            retrieval.scores.push(scored.score);
            retrieval.evidence.push(scored.evidence);
        }
        Ok(retrieval)
    }
}
