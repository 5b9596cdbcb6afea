use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use tracing::debug;

use crate::embed::{pad_embedding, resolve_dimension, Embedder, EmbedderType, Embedding};
use crate::{Error, Result};

/// Local embedder backed by fastembed.
///
/// The model runs in-process through ONNX runtime. Inference needs mutable
/// access to the session, so it sits behind a mutex and the embedder can be
/// shared between tasks.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    kind: EmbedderType,
    dimension: usize,
}

impl FastEmbedder {
    /// Create a new embedder, optionally padding output to `target_dimension`.
    ///
    /// Downloads the model on first use. Fails with [`Error::Config`] when the
    /// model's natural dimension exceeds the target.
    pub fn new(kind: EmbedderType, target_dimension: Option<usize>) -> Result<Self> {
        let dimension = resolve_dimension(kind.natural_dimension(), target_dimension)?;
        let opts = InitOptions::new(model_for(kind)).with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model: Mutex::new(model),
                kind,
                dimension,
            })
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}

fn model_for(kind: EmbedderType) -> EmbeddingModel {
    match kind {
        EmbedderType::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
        EmbedderType::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
        EmbedderType::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
        EmbedderType::NomicEmbedTextV15 => EmbeddingModel::NomicEmbedTextV15,
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, chunks: &[String]) -> Result<Vec<Embedding>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .model
            .lock()
            .embed(chunks, None)
            .map_err(|e| Error::Embedding(e.to_string()))?;

        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "model returned {} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        debug!(model = %self.kind, chunks = chunks.len(), "embedded batch");

        vectors
            .into_iter()
            .map(|v| pad_embedding(v, self.dimension))
            .collect()
    }

    fn embedder_type(&self) -> EmbedderType {
        self.kind
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
