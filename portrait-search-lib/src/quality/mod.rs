//! Retrieval quality evaluation
//!
//! ```text
//! dataset/<experiment>/*.yaml -> [DatasetEntry] -> expected relevances
//!                                                        |
//!               Judge: Retriever per query -> ranked paths + expected
//!                                                        |
//!                                            Metric::ALL -> scores
//! ```
//!
//! - [`dataset`]: labelled queries with graded portrait matches
//! - [`judge`]: tag-weighted expected relevance and the evaluation loop
//! - [`metrics`]: precision@k and MRR, plain and relevance-weighted
//! - [`experiments`]: named retrieval configurations to compare

pub mod dataset;
pub mod experiments;
pub mod judge;
pub mod metrics;

pub use dataset::{load_dataset, store_dataset, validate_dataset, DatasetEntry, PortraitMatch, Query};
pub use experiments::{experiments, Experiment};
pub use judge::{prepare_expected_results, EvaluationResult, ExpectedResult, Judge};
pub use metrics::{Metric, QueryOutcome};
