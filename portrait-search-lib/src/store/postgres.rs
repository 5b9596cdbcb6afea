use async_trait::async_trait;
use pgvector::Vector;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

use crate::embed::EmbedderType;
use crate::portrait::{PortraitId, PortraitRecord, PortraitStore};
use crate::split::SplitterType;
use crate::store::{
    DistanceType, EmbeddingId, EmbeddingRecord, EmbeddingSimilarity, EmbeddingStore,
    NewEmbedding, VectorQuery,
};
use crate::{Error, Result};

const EMBEDDING_COLUMNS: &str =
    "id, portrait_id, embedding, embedded_text, splitter_type, embedder_type, experiment";
const PORTRAIT_COLUMNS: &str =
    "id, fulllength_path, medium_path, small_path, tags, url, hash, query, description";

/// Postgres store using the pgvector extension.
///
/// Portraits and embeddings live in the `portraits` and `embeddings` tables.
/// Call [`prepare_schema`](Self::prepare_schema) once before first use.
///
/// Reads share the client and are pipelined on the connection; only the
/// `insert_many` transaction takes it exclusively.
pub struct PgStore {
    client: RwLock<Client>,
}

impl PgStore {
    /// Connect to Postgres at `url` (postgres://...).
    pub async fn connect(url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(%err, "postgres connection error");
            }
        });

        Ok(Self {
            client: RwLock::new(client),
        })
    }

    /// Create the extension, tables and indices if missing.
    ///
    /// `dimension` fixes the vector column size; the HNSW index is built for
    /// `distance`.
    pub async fn prepare_schema(&self, dimension: usize, distance: DistanceType) -> Result<()> {
        if dimension == 0 {
            return Err(Error::Config("embedding dimension must be positive".to_string()));
        }

        let ddl = format!(
            "CREATE EXTENSION IF NOT EXISTS vector;
             CREATE TABLE IF NOT EXISTS portraits (
                id UUID PRIMARY KEY,
                fulllength_path TEXT NOT NULL,
                medium_path TEXT NOT NULL,
                small_path TEXT NOT NULL,
                tags TEXT[] NOT NULL,
                url TEXT NOT NULL,
                hash TEXT NOT NULL UNIQUE,
                query TEXT NOT NULL,
                description TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS embeddings (
                id UUID PRIMARY KEY,
                portrait_id UUID NOT NULL,
                embedding VECTOR({dimension}) NOT NULL,
                embedded_text TEXT NOT NULL,
                splitter_type TEXT NOT NULL,
                embedder_type TEXT NOT NULL,
                experiment TEXT
             );
             CREATE INDEX IF NOT EXISTS embeddings_strategy_idx
                ON embeddings (splitter_type, embedder_type, experiment);
             CREATE INDEX IF NOT EXISTS embeddings_{name}_hnsw_idx
                ON embeddings USING hnsw (embedding {ops});",
            name = distance.as_str().replace('-', "_"),
            ops = operator_class(distance),
        );

        self.client.read().await.batch_execute(&ddl).await?;
        Ok(())
    }
}

fn operator(distance: DistanceType) -> &'static str {
    match distance {
        DistanceType::Cosine => "<=>",
        DistanceType::Euclidean => "<->",
        DistanceType::DotProduct => "<#>",
    }
}

fn operator_class(distance: DistanceType) -> &'static str {
    match distance {
        DistanceType::Cosine => "vector_cosine_ops",
        DistanceType::Euclidean => "vector_l2_ops",
        DistanceType::DotProduct => "vector_ip_ops",
    }
}

fn vector_search_sql(distance: DistanceType) -> String {
    let op = operator(distance);
    format!(
        "SELECT portrait_id, embedding, embedded_text, (embedding {op} $1)::float8 AS distance \
         FROM embeddings \
         WHERE splitter_type = $2 AND embedder_type = $3 AND experiment IS NOT DISTINCT FROM $4 \
         ORDER BY embedding {op} $1 ASC \
         LIMIT $5"
    )
}

fn embedding_from_row(row: &Row) -> Result<EmbeddingRecord> {
    let embedding: Vector = row.try_get("embedding")?;
    let splitter_type: String = row.try_get("splitter_type")?;
    let embedder_type: String = row.try_get("embedder_type")?;

    Ok(EmbeddingRecord {
        id: EmbeddingId(row.try_get("id")?),
        portrait_id: PortraitId(row.try_get("portrait_id")?),
        embedding: embedding.to_vec(),
        embedded_text: row.try_get("embedded_text")?,
        splitter_type: splitter_type.parse()?,
        embedder_type: embedder_type.parse()?,
        experiment: row.try_get("experiment")?,
    })
}

fn portrait_from_row(row: &Row) -> Result<PortraitRecord> {
    Ok(PortraitRecord {
        id: PortraitId(row.try_get("id")?),
        fulllength_path: row.try_get("fulllength_path")?,
        medium_path: row.try_get("medium_path")?,
        small_path: row.try_get("small_path")?,
        tags: row.try_get("tags")?,
        url: row.try_get("url")?,
        hash: row.try_get("hash")?,
        query: row.try_get("query")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl EmbeddingStore for PgStore {
    async fn insert_many(&self, records: Vec<NewEmbedding>) -> Result<Vec<EmbeddingRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut client = self.client.write().await;
        let transaction = client.transaction().await?;
        let statement = transaction
            .prepare(&format!(
                "INSERT INTO embeddings ({EMBEDDING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .await?;

        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            let record = record.with_id(EmbeddingId::new());
            let vector = Vector::from(record.embedding.clone());
            transaction
                .execute(
                    &statement,
                    &[
                        &record.id.0,
                        &record.portrait_id.0,
                        &vector,
                        &record.embedded_text,
                        &record.splitter_type.as_str(),
                        &record.embedder_type.as_str(),
                        &record.experiment,
                    ],
                )
                .await?;
            stored.push(record);
        }
        transaction.commit().await?;

        debug!(inserted = stored.len(), "inserted embeddings");
        Ok(stored)
    }

    async fn get_by_type(
        &self,
        splitter_type: SplitterType,
        embedder_type: EmbedderType,
    ) -> Result<Vec<EmbeddingRecord>> {
        let rows = self
            .client
            .read()
            .await
            .query(
                &format!(
                    "SELECT {EMBEDDING_COLUMNS} FROM embeddings \
                     WHERE splitter_type = $1 AND embedder_type = $2"
                ),
                &[&splitter_type.as_str(), &embedder_type.as_str()],
            )
            .await?;

        rows.iter().map(embedding_from_row).collect()
    }

    async fn vector_search(&self, query: &VectorQuery<'_>) -> Result<Vec<EmbeddingSimilarity>> {
        let limit = i64::try_from(query.limit)
            .map_err(|_| Error::InvalidInput(format!("limit {} out of range", query.limit)))?;
        let vector = Vector::from(query.vector.to_vec());

        let rows = self
            .client
            .read()
            .await
            .query(
                &vector_search_sql(query.distance),
                &[
                    &vector,
                    &query.splitter_type.as_str(),
                    &query.embedder_type.as_str(),
                    &query.experiment,
                    &limit,
                ],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let embedding: Vector = row.try_get("embedding")?;
                let distance: f64 = row.try_get("distance")?;
                Ok(EmbeddingSimilarity {
                    portrait_id: PortraitId(row.try_get("portrait_id")?),
                    embedding: embedding.to_vec(),
                    embedded_text: row.try_get("embedded_text")?,
                    similarity: query.distance.similarity_from_distance(distance as f32),
                    query: None,
                    query_text: None,
                })
            })
            .collect()
    }

    async fn delete(&self, id: EmbeddingId) -> Result<bool> {
        let deleted = self
            .client
            .read()
            .await
            .execute("DELETE FROM embeddings WHERE id = $1", &[&id.0])
            .await?;
        Ok(deleted > 0)
    }

    async fn count(&self) -> Result<usize> {
        let row = self
            .client
            .read()
            .await
            .query_one("SELECT COUNT(*) FROM embeddings", &[])
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl PortraitStore for PgStore {
    async fn get_one(&self, id: PortraitId) -> Result<PortraitRecord> {
        let row = self
            .client
            .read()
            .await
            .query_opt(
                &format!("SELECT {PORTRAIT_COLUMNS} FROM portraits WHERE id = $1"),
                &[&id.0],
            )
            .await?;

        match row {
            Some(row) => portrait_from_row(&row),
            None => Err(Error::NotFound(format!("portrait {id}"))),
        }
    }

    async fn get_many(&self) -> Result<Vec<PortraitRecord>> {
        let rows = self
            .client
            .read()
            .await
            .query(
                &format!("SELECT {PORTRAIT_COLUMNS} FROM portraits ORDER BY fulllength_path"),
                &[],
            )
            .await?;

        rows.iter().map(portrait_from_row).collect()
    }

    async fn insert(&self, portrait: PortraitRecord) -> Result<PortraitRecord> {
        self.client
            .read()
            .await
            .execute(
                &format!(
                    "INSERT INTO portraits ({PORTRAIT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
                ),
                &[
                    &portrait.id.0,
                    &portrait.fulllength_path,
                    &portrait.medium_path,
                    &portrait.small_path,
                    &portrait.tags,
                    &portrait.url,
                    &portrait.hash,
                    &portrait.query,
                    &portrait.description,
                ],
            )
            .await?;
        Ok(portrait)
    }

    async fn distinct_hashes(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .read()
            .await
            .query("SELECT DISTINCT hash FROM portraits", &[])
            .await?;

        rows.iter()
            .map(|row| row.try_get::<_, String>("hash").map_err(Error::from))
            .collect()
    }
}
