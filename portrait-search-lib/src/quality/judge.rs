//! Dataset-driven evaluation of a retriever

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use super::dataset::{load_dataset, DatasetEntry};
pub use super::metrics::ExpectedResult;
use super::metrics::{Metric, QueryOutcome};
use crate::retrieve::{Retriever, DEFAULT_LIMIT};
use crate::Result;

/// Metric name to score
pub type EvaluationResult = BTreeMap<String, f64>;

/// Graded relevance of every labelled portrait, keyed by query text.
///
/// A tag's weight is the inverse of the number of queries (across the whole
/// dataset) that use it, renormalised so the weights of one query's tags sum
/// to 1. A portrait's relevance is the sum of the weights of its tags, so a
/// portrait matching every tag of its query scores 1.
///
/// Query tags no portrait carries still take their share of the weight.
/// When two queries share a text, the later one's labels replace the earlier.
pub fn prepare_expected_results(dataset: &[DatasetEntry]) -> BTreeMap<String, ExpectedResult> {
    let mut vocabulary: HashMap<&str, usize> = HashMap::new();
    for query in dataset.iter().flat_map(|e| &e.queries) {
        for tag in &query.matches {
            *vocabulary.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut expected = BTreeMap::new();
    for query in dataset.iter().flat_map(|e| &e.queries) {
        let raw: Vec<(&str, f64)> = query
            .matches
            .iter()
            .map(|tag| {
                let count = vocabulary.get(tag.as_str()).copied().unwrap_or(1);
                (tag.as_str(), 1.0 / count as f64)
            })
            .collect();
        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        let weights: HashMap<&str, f64> = raw
            .into_iter()
            .map(|(tag, w)| (tag, if total > 0.0 { w / total } else { 0.0 }))
            .collect();

        let relevances = query
            .portraits
            .iter()
            .map(|portrait| {
                let relevance: f64 = portrait
                    .matches
                    .iter()
                    .filter_map(|tag| weights.get(tag.as_str()))
                    .sum();
                (portrait.path.clone(), relevance)
            })
            .collect();
        if expected.insert(query.query.clone(), relevances).is_some() {
            warn!(query = %query.query, "duplicate query text, earlier labels dropped");
        }
    }
    expected
}

/// Fold outcomes through every metric.
pub fn score(outcomes: &[QueryOutcome]) -> EvaluationResult {
    Metric::ALL
        .iter()
        .map(|metric| (metric.name().to_string(), metric.compute(outcomes)))
        .collect()
}

/// Runs a retriever over every dataset query and scores the rankings.
pub struct Judge<R: Retriever> {
    retriever: R,
    dataset: Vec<DatasetEntry>,
    experiment: String,
    limit: usize,
}

impl<R: Retriever> Judge<R> {
    /// `experiment` also scopes the retriever's embedding search.
    pub fn new(retriever: R, dataset: Vec<DatasetEntry>, experiment: impl Into<String>) -> Self {
        Self {
            retriever,
            dataset,
            experiment: experiment.into(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Load the dataset from `dataset_root/experiment`.
    pub fn from_experiment_dir(retriever: R, dataset_root: &Path, experiment: &str) -> Result<Self> {
        let dataset = load_dataset(dataset_root, experiment)?;
        Ok(Self::new(retriever, dataset, experiment))
    }

    /// Number of portraits retrieved per query
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Retrieve every query and pair the ranking with its expected result.
    ///
    /// Queries run sequentially; the first failing retrieval aborts the run.
    #[instrument(skip(self), fields(experiment = %self.experiment, limit = self.limit))]
    pub async fn evaluate_detailed(&self) -> Result<Vec<QueryOutcome>> {
        let expected = prepare_expected_results(&self.dataset);
        info!(queries = expected.len(), "evaluating");

        let mut outcomes = Vec::with_capacity(expected.len());
        for (query, expected) in expected {
            let retrieval = self
                .retriever
                .get_portraits(&query, Some(self.experiment.as_str()), self.limit)
                .await?;
            let retrieved = retrieval
                .portraits
                .into_iter()
                .map(|p| p.fulllength_path)
                .collect::<Vec<_>>();
            debug!(query = %query, retrieved = retrieved.len(), "retrieved");
            outcomes.push(QueryOutcome::new(query, retrieved, expected));
        }
        Ok(outcomes)
    }

    /// Score the retriever with every metric.
    pub async fn evaluate(&self) -> Result<EvaluationResult> {
        let result = score(&self.evaluate_detailed().await?);
        info!(?result, "evaluation finished");
        Ok(result)
    }
}
