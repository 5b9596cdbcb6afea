//! Runtime configuration and component wiring
//!
//! [`Settings`] names every strategy and location; the helpers on it build
//! the concrete components once, at the entry point, and hand them to the
//! retriever and judge as constructor arguments.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::embed::{resolve_dimension, EmbedderType, FastEmbedder};
use crate::portrait::PortraitStore;
use crate::quality::Experiment;
use crate::retrieve::SimilarityRetriever;
use crate::split::{AnySplitter, SplitterType};
use crate::store::{DistanceType, EmbeddingStore, MemoryStore, PgStore};
use crate::{Error, Result};

/// Default width of stored vectors; fits every supported model.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Where portraits and embeddings are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// In-process store, optionally persisted to a JSON snapshot
    Memory { snapshot: Option<PathBuf> },
    /// Postgres with pgvector
    Postgres { url: String },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Memory { snapshot: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding one sub-directory per dataset
    pub dataset_root: PathBuf,
    /// Directory that dataset portrait paths are relative to
    pub portraits_root: PathBuf,
    pub splitter_type: SplitterType,
    pub embedder_type: EmbedderType,
    /// Pad vectors to this width; `None` keeps the model's own
    pub embedding_dimension: Option<usize>,
    pub distance: DistanceType,
    pub backend: BackendConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("dataset"),
            portraits_root: PathBuf::from("data/portraits"),
            splitter_type: SplitterType::RecursiveChunk120Overlap60,
            embedder_type: EmbedderType::BgeBaseEnV15,
            embedding_dimension: Some(DEFAULT_EMBEDDING_DIMENSION),
            distance: DistanceType::Euclidean,
            backend: BackendConfig::default(),
        }
    }
}

impl Settings {
    /// Same settings with an experiment's strategies.
    #[must_use]
    pub fn for_experiment(&self, experiment: &Experiment) -> Self {
        Self {
            splitter_type: experiment.splitter_type,
            embedder_type: experiment.embedder_type,
            distance: experiment.distance,
            ..self.clone()
        }
    }

    /// Width of stored vectors for the configured embedder.
    pub fn dimension(&self) -> Result<usize> {
        if self.embedding_dimension == Some(0) {
            return Err(Error::Config("embedding dimension must be positive".into()));
        }
        resolve_dimension(self.embedder_type.natural_dimension(), self.embedding_dimension)
    }

    pub fn splitter(&self) -> AnySplitter {
        self.splitter_type.splitter()
    }

    /// Load the configured embedding model.
    pub fn embedder(&self) -> Result<FastEmbedder> {
        self.dimension()?;
        FastEmbedder::new(self.embedder_type, self.embedding_dimension)
    }

    /// Open the configured backend, preparing its schema if needed.
    pub async fn open_backend(&self) -> Result<Backend> {
        match &self.backend {
            BackendConfig::Memory { snapshot } => {
                let store = match snapshot {
                    Some(path) => MemoryStore::open(path)?,
                    None => MemoryStore::new(),
                };
                Ok(Backend::Memory(Arc::new(store)))
            }
            BackendConfig::Postgres { url } => {
                let store = PgStore::connect(url).await?;
                store.prepare_schema(self.dimension()?, self.distance).await?;
                info!("connected to postgres");
                Ok(Backend::Postgres(Arc::new(store)))
            }
        }
    }

    /// Build a retriever over `backend` with the configured strategies.
    pub fn retriever(&self, backend: &Backend) -> Result<SimilarityRetriever<AnySplitter, FastEmbedder>> {
        Ok(SimilarityRetriever::new(
            self.splitter(),
            self.embedder()?,
            backend.embeddings(),
            backend.portraits(),
            self.distance,
        ))
    }
}

/// An opened storage backend serving both store traits.
#[derive(Clone)]
pub enum Backend {
    Memory(Arc<MemoryStore>),
    Postgres(Arc<PgStore>),
}

impl Backend {
    pub fn embeddings(&self) -> Arc<dyn EmbeddingStore> {
        match self {
            Self::Memory(store) => store.clone(),
            Self::Postgres(store) => store.clone(),
        }
    }

    pub fn portraits(&self) -> Arc<dyn PortraitStore> {
        match self {
            Self::Memory(store) => store.clone(),
            Self::Postgres(store) => store.clone(),
        }
    }

    /// Flush pending state. Only the memory snapshot needs it.
    pub fn persist(&self) -> Result<()> {
        match self {
            Self::Memory(store) => store.save(),
            Self::Postgres(_) => Ok(()),
        }
    }
}
