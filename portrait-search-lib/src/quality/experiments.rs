//! Registry of retrieval configurations evaluated against the datasets

use serde::Serialize;

use crate::embed::EmbedderType;
use crate::split::SplitterType;
use crate::store::DistanceType;

/// One retrieval configuration and the dataset it is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Experiment {
    pub description: &'static str,
    /// Dataset directory name, also the experiment tag of its embeddings
    pub dataset: &'static str,
    pub splitter_type: SplitterType,
    pub embedder_type: EmbedderType,
    pub distance: DistanceType,
}

/// Every configured experiment, in reporting order.
pub fn experiments() -> Vec<Experiment> {
    vec![
        Experiment {
            description: "[V1] 120 chunk and BGE base embeddings",
            dataset: "v1",
            splitter_type: SplitterType::RecursiveChunk120Overlap60,
            embedder_type: EmbedderType::BgeBaseEnV15,
            distance: DistanceType::Euclidean,
        },
        Experiment {
            description: "[V1] 120 chunk and MiniLM embeddings",
            dataset: "v1",
            splitter_type: SplitterType::RecursiveChunk120Overlap60,
            embedder_type: EmbedderType::AllMiniLmL6V2,
            distance: DistanceType::Euclidean,
        },
        Experiment {
            description: "[V1] 200 chunk and BGE base embeddings",
            dataset: "v1",
            splitter_type: SplitterType::RecursiveChunk200Overlap80,
            embedder_type: EmbedderType::BgeBaseEnV15,
            distance: DistanceType::Euclidean,
        },
        Experiment {
            description: "[V1] combined 160/120 chunks and BGE base embeddings",
            dataset: "v1",
            splitter_type: SplitterType::Combined160Overlap40And120Overlap60,
            embedder_type: EmbedderType::BgeBaseEnV15,
            distance: DistanceType::Euclidean,
        },
        Experiment {
            description: "[V1] 120 chunk and Nomic embeddings, cosine",
            dataset: "v1",
            splitter_type: SplitterType::RecursiveChunk120Overlap60,
            embedder_type: EmbedderType::NomicEmbedTextV15,
            distance: DistanceType::Cosine,
        },
    ]
}
