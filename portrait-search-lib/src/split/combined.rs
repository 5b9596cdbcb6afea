use crate::split::{RecursiveSplitter, Splitter, SplitterType};

/// Splitter that indexes the union of several recursive chunkings
///
/// Documents get chunks from every inner splitter, in order. Queries are
/// kept whole since they are short compared to any of the inner chunk sizes.
#[derive(Debug, Clone)]
pub struct CombinedSplitter {
    kind: SplitterType,
    inner: Vec<RecursiveSplitter>,
}

impl CombinedSplitter {
    pub(crate) fn new(kind: SplitterType, parts: Vec<SplitterType>) -> Self {
        let inner = parts
            .into_iter()
            .filter_map(|part| {
                let (chunk_size, chunk_overlap) = part.recursive_params()?;
                Some(RecursiveSplitter {
                    chunk_size,
                    chunk_overlap,
                    kind: part,
                })
            })
            .collect();
        Self { kind, inner }
    }
}

impl Splitter for CombinedSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        self.inner.iter().flat_map(|s| s.split(text)).collect()
    }

    fn split_query(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    }

    fn splitter_type(&self) -> SplitterType {
        self.kind
    }
}
