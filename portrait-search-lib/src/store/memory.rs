use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::EmbedderType;
use crate::portrait::{PortraitId, PortraitRecord, PortraitStore};
use crate::split::SplitterType;
use crate::store::{
    EmbeddingId, EmbeddingRecord, EmbeddingSimilarity, EmbeddingStore, NewEmbedding, VectorQuery,
};
use crate::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    portraits: Vec<PortraitRecord>,
    embeddings: Vec<EmbeddingRecord>,
}

/// In-memory portrait and embedding store.
///
/// Uses exact brute-force search. Suitable for small corpora (a few
/// thousand portraits). When opened from a snapshot path, [`save`](Self::save)
/// writes the whole state back as JSON so separate runs can share it.
pub struct MemoryStore {
    state: RwLock<State>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            snapshot: None,
        }
    }

    /// Open a store backed by a JSON snapshot, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let state = if path.exists() {
            let bytes = fs::read(path)?;
            serde_json::from_slice(&bytes)?
        } else {
            State::default()
        };
        debug!(
            path = %path.display(),
            portraits = state.portraits.len(),
            embeddings = state.embeddings.len(),
            "opened memory store"
        );

        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Write the current state to the snapshot file, if there is one.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&*self.state.read())?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn insert_many(&self, records: Vec<NewEmbedding>) -> Result<Vec<EmbeddingRecord>> {
        let stored: Vec<EmbeddingRecord> = records
            .into_iter()
            .map(|r| r.with_id(EmbeddingId::new()))
            .collect();

        self.state.write().embeddings.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn get_by_type(
        &self,
        splitter_type: SplitterType,
        embedder_type: EmbedderType,
    ) -> Result<Vec<EmbeddingRecord>> {
        Ok(self
            .state
            .read()
            .embeddings
            .iter()
            .filter(|r| r.splitter_type == splitter_type && r.embedder_type == embedder_type)
            .cloned()
            .collect())
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<EmbeddingSimilarity>> {
        let state = self.state.read();

        let mut results = Vec::new();
        for record in state.embeddings.iter().filter(|r| query.matches(r)) {
            if record.embedding.len() != query.vector.len() {
                return Err(Error::InvalidInput(format!(
                    "query vector has dimension {} but stored embedding {} has {}",
                    query.vector.len(),
                    record.id,
                    record.embedding.len()
                )));
            }
            results.push(EmbeddingSimilarity {
                portrait_id: record.portrait_id,
                embedding: record.embedding.clone(),
                embedded_text: record.embedded_text.clone(),
                similarity: query.distance.similarity(query.vector, &record.embedding),
                query: None,
                query_text: None,
            });
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(query.limit);
        Ok(results)
    }

    async fn delete(&self, id: EmbeddingId) -> Result<bool> {
        let mut state = self.state.write();
        let before = state.embeddings.len();
        state.embeddings.retain(|r| r.id != id);
        Ok(state.embeddings.len() != before)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().embeddings.len())
    }
}

#[async_trait]
impl PortraitStore for MemoryStore {
    async fn get_one(&self, id: PortraitId) -> Result<PortraitRecord> {
        self.state
            .read()
            .portraits
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("portrait {id}")))
    }

    async fn get_many(&self) -> Result<Vec<PortraitRecord>> {
        Ok(self.state.read().portraits.clone())
    }

    async fn insert(&self, portrait: PortraitRecord) -> Result<PortraitRecord> {
        let mut state = self.state.write();
        if let Some(existing) = state
            .portraits
            .iter()
            .find(|p| p.hash == portrait.hash || p.id == portrait.id)
        {
            return Err(Error::Store(format!(
                "portrait {} conflicts with existing portrait {} (hash {})",
                portrait.fulllength_path, existing.id, existing.hash
            )));
        }
        state.portraits.push(portrait.clone());
        Ok(portrait)
    }

    async fn distinct_hashes(&self) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .portraits
            .iter()
            .map(|p| p.hash.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DistanceType;

    const SPLITTER: SplitterType = SplitterType::RecursiveChunk120Overlap60;
    const EMBEDDER: EmbedderType = EmbedderType::AllMiniLmL6V2;

    fn make_embedding(portrait_id: PortraitId, text: &str, embedding: Vec<f32>) -> NewEmbedding {
        NewEmbedding {
            portrait_id,
            embedding,
            embedded_text: text.to_string(),
            splitter_type: SPLITTER,
            embedder_type: EMBEDDER,
            experiment: None,
        }
    }

    fn make_portrait(hash: &str) -> PortraitRecord {
        PortraitRecord {
            id: PortraitId::new(),
            fulllength_path: format!("{hash}/fulllength.png"),
            medium_path: format!("{hash}/medium.png"),
            small_path: format!("{hash}/small.png"),
            tags: vec!["elf".to_string()],
            url: "https://example.com/portraits".to_string(),
            hash: hash.to_string(),
            query: String::new(),
            description: "A female elf".to_string(),
        }
    }

    fn query(vector: &[f32], limit: usize) -> VectorQuery<'_> {
        VectorQuery::new(vector, SPLITTER, EMBEDDER, DistanceType::Cosine, limit)
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let store = MemoryStore::new();
        assert_eq!(store.count().await.unwrap(), 0);

        let pid = PortraitId::new();
        let stored = store
            .insert_many(vec![
                make_embedding(pid, "hello", vec![1.0, 0.0]),
                make_embedding(pid, "world", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert_ne!(stored[0].id, stored[1].id);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_returns_sorted() {
        let store = MemoryStore::new();
        let pid = PortraitId::new();
        store
            .insert_many(vec![
                make_embedding(pid, "far away", vec![0.0, 1.0, 0.0]),
                make_embedding(pid, "very close", vec![1.0, 0.0, 0.0]),
                make_embedding(pid, "medium", vec![0.5, 0.5, 0.0]),
            ])
            .await
            .unwrap();

        let vector = vec![1.0, 0.0, 0.0];
        let results = store.vector_search(&query(&vector, 3)).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].embedded_text, "very close");
        assert_eq!(results[1].embedded_text, "medium");
        assert_eq!(results[2].embedded_text, "far away");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let store = MemoryStore::new();
        let pid = PortraitId::new();
        store
            .insert_many(vec![
                make_embedding(pid, "a", vec![1.0, 0.0]),
                make_embedding(pid, "b", vec![0.9, 0.1]),
                make_embedding(pid, "c", vec![0.8, 0.2]),
            ])
            .await
            .unwrap();

        let vector = vec![1.0, 0.0];
        assert_eq!(store.vector_search(&query(&vector, 2)).await.unwrap().len(), 2);
        assert_eq!(store.vector_search(&query(&vector, 100)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_search_scoped_by_strategy_and_experiment() {
        let store = MemoryStore::new();
        let pid = PortraitId::new();

        let mut other_splitter = make_embedding(pid, "other splitter", vec![1.0, 0.0]);
        other_splitter.splitter_type = SplitterType::RecursiveChunk160Overlap40;
        let mut other_embedder = make_embedding(pid, "other embedder", vec![1.0, 0.0]);
        other_embedder.embedder_type = EmbedderType::BgeSmallEnV15;
        let mut tagged = make_embedding(pid, "experiment", vec![1.0, 0.0]);
        tagged.experiment = Some("v1".to_string());

        store
            .insert_many(vec![
                make_embedding(pid, "main", vec![1.0, 0.0]),
                other_splitter,
                other_embedder,
                tagged,
            ])
            .await
            .unwrap();

        let vector = vec![1.0, 0.0];
        let main = store.vector_search(&query(&vector, 10)).await.unwrap();
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].embedded_text, "main");

        let experiment = store
            .vector_search(&query(&vector, 10).with_experiment(Some("v1")))
            .await
            .unwrap();
        assert_eq!(experiment.len(), 1);
        assert_eq!(experiment[0].embedded_text, "experiment");
    }

    #[tokio::test]
    async fn test_search_rejects_dimension_mismatch() {
        let store = MemoryStore::new();
        store
            .insert_many(vec![make_embedding(PortraitId::new(), "a", vec![1.0, 0.0])])
            .await
            .unwrap();

        let vector = vec![1.0, 0.0, 0.0];
        let err = store.vector_search(&query(&vector, 1)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_get_by_type_and_delete() {
        let store = MemoryStore::new();
        let pid = PortraitId::new();
        let mut other = make_embedding(pid, "other", vec![1.0]);
        other.embedder_type = EmbedderType::BgeBaseEnV15;

        let stored = store
            .insert_many(vec![make_embedding(pid, "mine", vec![1.0]), other])
            .await
            .unwrap();

        let mine = store.get_by_type(SPLITTER, EMBEDDER).await.unwrap();
        assert_eq!(mine, vec![stored[0].clone()]);

        assert!(store.delete(stored[0].id).await.unwrap());
        assert!(!store.delete(stored[0].id).await.unwrap());
        assert!(store.get_by_type(SPLITTER, EMBEDDER).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_search() {
        let store = MemoryStore::new();
        let vector = vec![1.0, 0.0];
        assert!(store.vector_search(&query(&vector, 5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_portrait_lookup() {
        let store = MemoryStore::new();
        let portrait = store.insert(make_portrait("abc")).await.unwrap();

        assert_eq!(store.get_one(portrait.id).await.unwrap(), portrait);
        assert_eq!(store.get_many().await.unwrap().len(), 1);
        assert_eq!(store.distinct_hashes().await.unwrap(), vec!["abc".to_string()]);

        let missing = store.get_one(PortraitId::new()).await.unwrap_err();
        assert!(matches!(missing, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = MemoryStore::new();
        store.insert(make_portrait("abc")).await.unwrap();

        let err = store.insert(make_portrait("abc")).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(store.get_many().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::open(&path).unwrap();
        let portrait = store.insert(make_portrait("abc")).await.unwrap();
        store
            .insert_many(vec![make_embedding(portrait.id, "hello", vec![1.0, 0.0])])
            .await
            .unwrap();
        store.save().unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.get_one(portrait.id).await.unwrap(), portrait);
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
