//! Text splitting strategies
//!
//! Portrait descriptions are split into overlapping chunks before embedding,
//! and queries are split again (possibly differently) at search time. Every
//! splitter carries a [`SplitterType`] identity; stored embeddings are scoped
//! by it so vectors from different chunkings never meet in one search.
//!
//! Splitting must be deterministic: the same text always yields the same
//! chunks, otherwise query chunks cannot be replayed against an index built
//! earlier.
//!
//! # Usage
//!
//! ```ignore
//! use portrait_search_lib::split::{Splitter, SplitterType};
//!
//! let splitter = SplitterType::RecursiveChunk120Overlap60.splitter();
//! let chunks = splitter.split(&portrait.description);
//! let query_chunks = splitter.split_query("elf ranger with a bow");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identity of a splitter configuration.
///
/// The kebab-case token is what gets persisted next to every embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SplitterType {
    #[serde(rename = "langchain-recursive-text-splitter-chunk-100-overlap-60")]
    RecursiveChunk100Overlap60,
    #[serde(rename = "langchain-recursive-text-splitter-chunk-120-overlap-40")]
    RecursiveChunk120Overlap40,
    #[serde(rename = "langchain-recursive-text-splitter-chunk-120-overlap-60")]
    RecursiveChunk120Overlap60,
    #[serde(rename = "langchain-recursive-text-splitter-chunk-160-overlap-40")]
    RecursiveChunk160Overlap40,
    #[serde(rename = "langchain-recursive-text-splitter-chunk-160-overlap-100")]
    RecursiveChunk160Overlap100,
    #[serde(rename = "langchain-recursive-text-splitter-chunk-200-overlap-80")]
    RecursiveChunk200Overlap80,
    #[serde(rename = "langchain-recursive-text-splitter-chunk-300-overlap-100")]
    RecursiveChunk300Overlap100,
    #[serde(rename = "combine-lchunk-160-o40-and-lchunk-120-o60")]
    Combined160Overlap40And120Overlap60,
}

impl SplitterType {
    /// Every known splitter identity.
    pub const ALL: [SplitterType; 8] = [
        SplitterType::RecursiveChunk100Overlap60,
        SplitterType::RecursiveChunk120Overlap40,
        SplitterType::RecursiveChunk120Overlap60,
        SplitterType::RecursiveChunk160Overlap40,
        SplitterType::RecursiveChunk160Overlap100,
        SplitterType::RecursiveChunk200Overlap80,
        SplitterType::RecursiveChunk300Overlap100,
        SplitterType::Combined160Overlap40And120Overlap60,
    ];

    /// Persisted identity token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecursiveChunk100Overlap60 => "langchain-recursive-text-splitter-chunk-100-overlap-60",
            Self::RecursiveChunk120Overlap40 => "langchain-recursive-text-splitter-chunk-120-overlap-40",
            Self::RecursiveChunk120Overlap60 => "langchain-recursive-text-splitter-chunk-120-overlap-60",
            Self::RecursiveChunk160Overlap40 => "langchain-recursive-text-splitter-chunk-160-overlap-40",
            Self::RecursiveChunk160Overlap100 => "langchain-recursive-text-splitter-chunk-160-overlap-100",
            Self::RecursiveChunk200Overlap80 => "langchain-recursive-text-splitter-chunk-200-overlap-80",
            Self::RecursiveChunk300Overlap100 => "langchain-recursive-text-splitter-chunk-300-overlap-100",
            Self::Combined160Overlap40And120Overlap60 => "combine-lchunk-160-o40-and-lchunk-120-o60",
        }
    }

    /// Chunk size and overlap for the single recursive variants.
    fn recursive_params(&self) -> Option<(usize, usize)> {
        match self {
            Self::RecursiveChunk100Overlap60 => Some((100, 60)),
            Self::RecursiveChunk120Overlap40 => Some((120, 40)),
            Self::RecursiveChunk120Overlap60 => Some((120, 60)),
            Self::RecursiveChunk160Overlap40 => Some((160, 40)),
            Self::RecursiveChunk160Overlap100 => Some((160, 100)),
            Self::RecursiveChunk200Overlap80 => Some((200, 80)),
            Self::RecursiveChunk300Overlap100 => Some((300, 100)),
            Self::Combined160Overlap40And120Overlap60 => None,
        }
    }

    /// Build the splitter this identity stands for.
    #[must_use]
    pub fn splitter(self) -> AnySplitter {
        match self.recursive_params() {
            Some((chunk_size, chunk_overlap)) => AnySplitter::Recursive(RecursiveSplitter {
                chunk_size,
                chunk_overlap,
                kind: self,
            }),
            None => AnySplitter::Combined(CombinedSplitter::new(
                self,
                vec![
                    SplitterType::RecursiveChunk160Overlap40,
                    SplitterType::RecursiveChunk120Overlap60,
                ],
            )),
        }
    }
}

impl fmt::Display for SplitterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| Error::Config(format!("unknown splitter type '{s}'")))
    }
}

/// Trait for text splitting strategies
pub trait Splitter: Send + Sync {
    /// Split a document into chunks for indexing.
    ///
    /// Non-blank input yields at least one chunk; whitespace-only input yields none.
    fn split(&self, text: &str) -> Vec<String>;

    /// Split a search query into chunks.
    ///
    /// May differ from [`split`](Self::split), e.g. keep the query whole.
    fn split_query(&self, text: &str) -> Vec<String>;

    /// Identity used to scope stored embeddings
    fn splitter_type(&self) -> SplitterType;
}

/// Closed set of concrete splitters.
#[derive(Debug, Clone)]
pub enum AnySplitter {
    Recursive(RecursiveSplitter),
    Combined(CombinedSplitter),
}

impl Splitter for AnySplitter {
    fn split(&self, text: &str) -> Vec<String> {
        match self {
            Self::Recursive(s) => s.split(text),
            Self::Combined(s) => s.split(text),
        }
    }

    fn split_query(&self, text: &str) -> Vec<String> {
        match self {
            Self::Recursive(s) => s.split_query(text),
            Self::Combined(s) => s.split_query(text),
        }
    }

    fn splitter_type(&self) -> SplitterType {
        match self {
            Self::Recursive(s) => s.splitter_type(),
            Self::Combined(s) => s.splitter_type(),
        }
    }
}

mod combined;
mod recursive;

pub use combined::*;
pub use recursive::*;
