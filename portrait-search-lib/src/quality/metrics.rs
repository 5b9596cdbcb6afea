//! Ranking metrics over graded relevance
//!
//! Every metric folds a list of [`QueryOutcome`]s into one score and divides
//! by the total number of queries, so a query without any hit pulls the
//! score down rather than being skipped. An empty outcome list scores 0.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Expected `(portrait path, relevance)` pairs for one query
pub type ExpectedResult = Vec<(String, f64)>;

/// Relevance closer than this to 1.0 counts as fully relevant.
pub const FULL_RELEVANCE_TOLERANCE: f64 = 1e-9;

/// What the retriever returned for one query next to what was expected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    /// Retrieved portrait paths, best first
    pub retrieved: Vec<String>,
    pub expected: ExpectedResult,
}

impl QueryOutcome {
    pub fn new(query: impl Into<String>, retrieved: Vec<String>, expected: ExpectedResult) -> Self {
        Self {
            query: query.into(),
            retrieved,
            expected,
        }
    }

    fn relevance(&self) -> HashMap<&str, f64> {
        self.expected
            .iter()
            .map(|(path, relevance)| (path.as_str(), *relevance))
            .collect()
    }

    fn is_fully_relevant(&self, relevance: &HashMap<&str, f64>, path: &str) -> bool {
        relevance
            .get(path)
            .is_some_and(|r| (r - 1.0).abs() < FULL_RELEVANCE_TOLERANCE)
    }
}

fn mean_over_queries(outcomes: &[QueryOutcome], per_query: impl Fn(&QueryOutcome) -> f64) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().map(per_query).sum::<f64>() / outcomes.len() as f64
}

/// Share of retrieved portraits that are fully relevant, averaged over queries.
pub fn precision_at_k(outcomes: &[QueryOutcome]) -> f64 {
    mean_over_queries(outcomes, |outcome| {
        if outcome.retrieved.is_empty() {
            return 0.0;
        }
        let relevance = outcome.relevance();
        let hits = outcome
            .retrieved
            .iter()
            .filter(|path| outcome.is_fully_relevant(&relevance, path))
            .count();
        hits as f64 / outcome.retrieved.len() as f64
    })
}

/// Reciprocal rank of the first fully relevant portrait, averaged over queries.
pub fn mean_reciprocal_rank(outcomes: &[QueryOutcome]) -> f64 {
    mean_over_queries(outcomes, |outcome| {
        let relevance = outcome.relevance();
        outcome
            .retrieved
            .iter()
            .position(|path| outcome.is_fully_relevant(&relevance, path))
            .map_or(0.0, |i| 1.0 / (i + 1) as f64)
    })
}

/// Summed relevance of retrieved portraits per retrieved slot, averaged over queries.
///
/// Partially relevant portraits count with their weight.
pub fn weighted_relevance_precision_at_k(outcomes: &[QueryOutcome]) -> f64 {
    mean_over_queries(outcomes, |outcome| {
        if outcome.retrieved.is_empty() {
            return 0.0;
        }
        let relevance = outcome.relevance();
        let gained: f64 = outcome
            .retrieved
            .iter()
            .filter_map(|path| relevance.get(path.as_str()))
            .sum();
        gained / outcome.retrieved.len() as f64
    })
}

/// Relevance of the first expected portrait divided by its rank, averaged over queries.
pub fn weighted_relevance_mean_reciprocal_rank(outcomes: &[QueryOutcome]) -> f64 {
    mean_over_queries(outcomes, |outcome| {
        let relevance = outcome.relevance();
        outcome
            .retrieved
            .iter()
            .enumerate()
            .find_map(|(i, path)| relevance.get(path.as_str()).map(|r| r / (i + 1) as f64))
            .unwrap_or(0.0)
    })
}

/// The metrics a judge reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    PrecisionAtK,
    MeanReciprocalRank,
    WeightedRelevancePrecisionAtK,
    WeightedRelevanceMeanReciprocalRank,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::PrecisionAtK,
        Metric::MeanReciprocalRank,
        Metric::WeightedRelevancePrecisionAtK,
        Metric::WeightedRelevanceMeanReciprocalRank,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PrecisionAtK => "precision@k",
            Self::MeanReciprocalRank => "mean_reciprocal_rank",
            Self::WeightedRelevancePrecisionAtK => "weighted_relevance_precision@k",
            Self::WeightedRelevanceMeanReciprocalRank => "weighted_relevance_mean_reciprocal_rank",
        }
    }

    pub fn compute(&self, outcomes: &[QueryOutcome]) -> f64 {
        match self {
            Self::PrecisionAtK => precision_at_k(outcomes),
            Self::MeanReciprocalRank => mean_reciprocal_rank(outcomes),
            Self::WeightedRelevancePrecisionAtK => weighted_relevance_precision_at_k(outcomes),
            Self::WeightedRelevanceMeanReciprocalRank => {
                weighted_relevance_mean_reciprocal_rank(outcomes)
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
