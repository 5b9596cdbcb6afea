//! Embedding generation for stored portraits
//!
//! Runs are idempotent per strategy pair and experiment tag: portraits that
//! already have embeddings for the configured splitter, embedder and
//! experiment are skipped.

use std::collections::HashSet;

use tracing::{info, instrument};

use crate::embed::Embedder;
use crate::portrait::{PortraitRecord, PortraitStore};
use crate::split::Splitter;
use crate::store::{EmbeddingStore, NewEmbedding};
use crate::{Error, Result};

/// Split and embed portrait descriptions.
///
/// All chunks of all portraits go to the embedder in one batch. The result
/// holds one record per chunk, grouped by portrait in input order.
pub fn portraits_to_embeddings<S, E>(
    portraits: &[PortraitRecord],
    splitter: &S,
    embedder: &E,
    experiment: Option<&str>,
) -> Result<Vec<NewEmbedding>>
where
    S: Splitter + ?Sized,
    E: Embedder + ?Sized,
{
    let mut owners = Vec::new();
    let mut chunks = Vec::new();
    for portrait in portraits {
        for chunk in splitter.split(&portrait.description) {
            owners.push(portrait.id);
            chunks.push(chunk);
        }
    }
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let embeddings = embedder.embed(&chunks)?;
    if embeddings.len() != chunks.len() {
        return Err(Error::Embedding(format!(
            "embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    Ok(owners
        .into_iter()
        .zip(chunks)
        .zip(embeddings)
        .map(|((portrait_id, embedded_text), embedding)| NewEmbedding {
            portrait_id,
            embedding,
            embedded_text,
            splitter_type: splitter.splitter_type(),
            embedder_type: embedder.embedder_type(),
            experiment: experiment.map(str::to_string),
        })
        .collect())
}

/// Embed every portrait that has no embeddings for this strategy pair and
/// experiment yet.
///
/// Returns the number of inserted embedding records.
#[instrument(skip_all, fields(
    splitter = %splitter.splitter_type(),
    embedder = %embedder.embedder_type(),
    experiment = ?experiment,
))]
pub async fn generate_embeddings<S, E>(
    portraits: &dyn PortraitStore,
    embeddings: &dyn EmbeddingStore,
    splitter: &S,
    embedder: &E,
    experiment: Option<&str>,
) -> Result<usize>
where
    S: Splitter + ?Sized,
    E: Embedder + ?Sized,
{
    let existing: HashSet<_> = embeddings
        .get_by_type(splitter.splitter_type(), embedder.embedder_type())
        .await?
        .into_iter()
        .filter(|r| r.experiment.as_deref() == experiment)
        .map(|r| r.portrait_id)
        .collect();

    let missing: Vec<PortraitRecord> = portraits
        .get_many()
        .await?
        .into_iter()
        .filter(|p| !existing.contains(&p.id))
        .collect();
    info!(
        already_embedded = existing.len(),
        missing = missing.len(),
        "embedding portraits"
    );

    let records = portraits_to_embeddings(&missing, splitter, embedder, experiment)?;
    let inserted = embeddings.insert_many(records).await?.len();
    info!(inserted, "stored embeddings");
    Ok(inserted)
}
