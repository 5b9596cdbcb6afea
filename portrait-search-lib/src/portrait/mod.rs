//! Portrait records and the portrait store
//!
//! A portrait is identified by the perceptual hash of its full-length image;
//! its generated `description` is the text that gets split and embedded.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Identifier of a stored portrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortraitId(pub Uuid);

impl PortraitId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PortraitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortraitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A portrait database record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortraitRecord {
    pub id: PortraitId,
    /// Paths relative to the portraits root
    pub fulllength_path: String,
    pub medium_path: String,
    pub small_path: String,
    pub tags: Vec<String>,
    /// Where the portrait was obtained from
    pub url: String,
    /// Perceptual hash of the full-length image, unique per portrait
    pub hash: String,
    /// Prompt used to generate `description`
    pub query: String,
    pub description: String,
}

/// Point-lookup storage for portrait records.
#[async_trait]
pub trait PortraitStore: Send + Sync {
    /// Fetch one portrait, failing with [`Error::NotFound`](crate::Error::NotFound) if absent.
    async fn get_one(&self, id: PortraitId) -> Result<PortraitRecord>;

    /// All stored portraits.
    async fn get_many(&self) -> Result<Vec<PortraitRecord>>;

    /// Insert a portrait. Fails if another portrait has the same hash.
    async fn insert(&self, portrait: PortraitRecord) -> Result<PortraitRecord>;

    /// Hashes of every stored portrait.
    async fn distinct_hashes(&self) -> Result<Vec<String>>;
}
