//! Portrait search CLI - indexing, search and retrieval-quality experiments
//!
//! # Commands
//!
//! ```bash
//! # Show how a description is chunked
//! portrait-search split --file description.txt
//!
//! # Load portraits and embed them with the configured strategies
//! portrait-search import portraits.json
//! portrait-search generate-embeddings --experiment v1
//!
//! # Search
//! portrait-search search "dwarf cleric with a warhammer" -k 5 --evidence
//!
//! # Evaluate against dataset/v1 and compare configured experiments
//! portrait-search validate-datasets v1
//! portrait-search evaluate v1 --report report.json
//! portrait-search experiments
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use portrait_search_lib::{
    config::{Backend, BackendConfig, Settings, DEFAULT_EMBEDDING_DIMENSION},
    embed::{Embedder, EmbedderType},
    index::generate_embeddings,
    portrait::{PortraitId, PortraitRecord, PortraitStore},
    quality::{experiments, judge, load_dataset, validate_dataset, EvaluationResult, Judge},
    retrieve::{Retriever, DEFAULT_LIMIT},
    split::{Splitter, SplitterType},
    store::DistanceType,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portrait-search")]
#[command(about = "Search character portraits by description and measure retrieval quality")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Memory,
    Postgres,
}

#[derive(Args)]
struct SettingsArgs {
    /// Directory with one sub-directory per dataset
    #[arg(long, global = true, env = "PORTRAIT_SEARCH_DATASET_ROOT", default_value = "dataset")]
    dataset_root: PathBuf,

    /// Directory dataset portrait paths are relative to
    #[arg(long, global = true, env = "PORTRAIT_SEARCH_PORTRAITS_ROOT", default_value = "data/portraits")]
    portraits_root: PathBuf,

    #[arg(long, global = true, env = "PORTRAIT_SEARCH_SPLITTER", default_value_t = SplitterType::RecursiveChunk120Overlap60)]
    splitter: SplitterType,

    #[arg(long, global = true, env = "PORTRAIT_SEARCH_EMBEDDER", default_value_t = EmbedderType::BgeBaseEnV15)]
    embedder: EmbedderType,

    /// Width vectors are zero-padded to
    #[arg(long, global = true, env = "PORTRAIT_SEARCH_DIMENSION", default_value_t = DEFAULT_EMBEDDING_DIMENSION)]
    dimension: usize,

    /// Keep the model's own vector width instead of padding
    #[arg(long, global = true)]
    natural_dimension: bool,

    #[arg(long, global = true, env = "PORTRAIT_SEARCH_DISTANCE", default_value_t = DistanceType::Euclidean)]
    distance: DistanceType,

    #[arg(long, global = true, env = "PORTRAIT_SEARCH_BACKEND", value_enum, default_value_t = BackendKind::Memory)]
    backend: BackendKind,

    /// JSON snapshot of the memory backend
    #[arg(long, global = true, env = "PORTRAIT_SEARCH_SNAPSHOT", default_value = "data/store.json")]
    snapshot: PathBuf,

    /// Postgres connection string for the postgres backend
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
}

impl SettingsArgs {
    fn into_settings(self) -> Result<Settings> {
        let backend = match self.backend {
            BackendKind::Memory => BackendConfig::Memory {
                snapshot: Some(self.snapshot),
            },
            BackendKind::Postgres => BackendConfig::Postgres {
                url: self
                    .database_url
                    .context("--database-url or DATABASE_URL is required for the postgres backend")?,
            },
        };

        Ok(Settings {
            dataset_root: self.dataset_root,
            portraits_root: self.portraits_root,
            splitter_type: self.splitter,
            embedder_type: self.embedder,
            embedding_dimension: (!self.natural_dimension).then_some(self.dimension),
            distance: self.distance,
            backend,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Split text with the configured splitter
    Split {
        /// Text to split (omit when using --file)
        text: Option<String>,

        /// Read the text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Split as a search query
        #[arg(short, long)]
        query: bool,
    },

    /// Embed text and show vector info
    Embed {
        /// Text to embed
        text: String,
    },

    /// Add portraits from a JSON file, skipping known hashes
    Import {
        /// JSON array of portraits
        input: PathBuf,
    },

    /// Embed every portrait that has no embeddings for the configured strategies
    GenerateEmbeddings {
        /// Tag the new embeddings with an experiment name
        #[arg(short, long)]
        experiment: Option<String>,
    },

    /// Find portraits matching a description
    Search {
        query: String,

        /// Number of portraits to return
        #[arg(short, default_value_t = DEFAULT_LIMIT)]
        k: usize,

        /// Search embeddings of this experiment instead of the main corpus
        #[arg(short, long)]
        experiment: Option<String>,

        /// Print the chunk matches behind every portrait
        #[arg(long)]
        evidence: bool,
    },

    /// Check dataset invariants and that every portrait file exists
    ValidateDatasets {
        #[arg(default_value = "v1")]
        datasets: Vec<String>,
    },

    /// Evaluate the configured strategies against one dataset
    Evaluate {
        #[arg(default_value = "v1")]
        dataset: String,

        /// Portraits retrieved per query
        #[arg(short, default_value_t = DEFAULT_LIMIT)]
        k: usize,

        /// Write per-query outcomes and scores as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run every configured experiment and print a comparison table
    Experiments {
        /// Portraits retrieved per query
        #[arg(short, default_value_t = DEFAULT_LIMIT)]
        k: usize,
    },
}

/// Portrait as produced by the description pipeline, before it gets an id.
#[derive(Deserialize)]
struct PortraitInput {
    fulllength_path: String,
    #[serde(default)]
    medium_path: String,
    #[serde(default)]
    small_path: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    url: String,
    hash: String,
    #[serde(default)]
    query: String,
    description: String,
}

impl From<PortraitInput> for PortraitRecord {
    fn from(input: PortraitInput) -> Self {
        PortraitRecord {
            id: PortraitId::new(),
            fulllength_path: input.fulllength_path,
            medium_path: input.medium_path,
            small_path: input.small_path,
            tags: input.tags,
            url: input.url,
            hash: input.hash,
            query: input.query,
            description: input.description,
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    dataset: &'a str,
    splitter: SplitterType,
    embedder: EmbedderType,
    distance: DistanceType,
    scores: &'a EvaluationResult,
    outcomes: &'a [portrait_search_lib::quality::QueryOutcome],
}

fn preview(text: &str, max: usize) -> String {
    let cut: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        format!("{cut}...")
    } else {
        cut
    }
}

fn print_table(rows: &[(String, EvaluationResult)]) {
    let metrics: Vec<&String> = rows
        .first()
        .map(|(_, scores)| scores.keys().collect())
        .unwrap_or_default();
    let width = rows.iter().map(|(d, _)| d.len()).max().unwrap_or(0).max(11);

    let mut header = format!("| {:<width$} |", "description");
    for metric in &metrics {
        header.push_str(&format!(" {metric} |"));
    }
    let rule = "-".repeat(header.len());

    println!("{rule}\n{header}\n{rule}");
    for (description, scores) in rows {
        let mut line = format!("| {description:<width$} |");
        for metric in &metrics {
            let score = scores.get(*metric).copied().unwrap_or_default();
            line.push_str(&format!(" {score:>w$.4} |", w = metric.len()));
        }
        println!("{line}");
    }
    println!("{rule}");
}

async fn open(settings: &Settings) -> Result<Backend> {
    settings
        .open_backend()
        .await
        .context("failed to open storage backend")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings.into_settings()?;

    match cli.command {
        Commands::Split { text, file, query } => {
            let text = match (text, file) {
                (Some(text), None) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                _ => bail!("pass either TEXT or --file"),
            };
            let splitter = settings.splitter();
            let chunks = if query {
                splitter.split_query(&text)
            } else {
                splitter.split(&text)
            };

            println!("Split into {} chunks using {}:\n", chunks.len(), splitter.splitter_type());
            for (i, chunk) in chunks.iter().enumerate() {
                println!("--- Chunk {} ({} chars) ---", i + 1, chunk.chars().count());
                println!("{chunk}\n");
            }
        }

        Commands::Embed { text } => {
            println!("Loading {} (first run downloads the model)...", settings.embedder_type);
            let embedder = settings.embedder().context("failed to load embedder")?;
            let embedding = embedder
                .embed(&[text])?
                .into_iter()
                .next()
                .context("embedder returned no vector")?;

            println!("\nEmbedding stats:");
            println!("  Dimensions: {}", embedding.len());
            println!("  Natural dimensions: {}", settings.embedder_type.natural_dimension());
            println!("  First 5 values: {:?}", &embedding[..embedding.len().min(5)]);
            println!("  Min: {:.4}", embedding.iter().cloned().fold(f32::INFINITY, f32::min));
            println!("  Max: {:.4}", embedding.iter().cloned().fold(f32::NEG_INFINITY, f32::max));
        }

        Commands::Import { input } => {
            let json = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let portraits: Vec<PortraitInput> =
                serde_json::from_str(&json).context("invalid portraits file")?;

            let backend = open(&settings).await?;
            let store = backend.portraits();
            let mut known: HashSet<String> = store.distinct_hashes().await?.into_iter().collect();

            let mut imported = 0;
            for portrait in portraits {
                if !known.insert(portrait.hash.clone()) {
                    continue;
                }
                store.insert(portrait.into()).await?;
                imported += 1;
            }
            backend.persist().context("failed to save store")?;
            println!("Imported {imported} new portraits ({} known)", known.len());
        }

        Commands::GenerateEmbeddings { experiment } => {
            let backend = open(&settings).await?;
            let embedder = settings.embedder().context("failed to load embedder")?;
            let inserted = generate_embeddings(
                &*backend.portraits(),
                &*backend.embeddings(),
                &settings.splitter(),
                &embedder,
                experiment.as_deref(),
            )
            .await?;
            backend.persist().context("failed to save store")?;
            println!(
                "Stored {inserted} embeddings for {} / {}",
                settings.splitter_type, settings.embedder_type
            );
        }

        Commands::Search {
            query,
            k,
            experiment,
            evidence,
        } => {
            let backend = open(&settings).await?;
            let retriever = settings.retriever(&backend)?;
            let retrieval = retriever
                .get_portraits(&query, experiment.as_deref(), k)
                .await?;

            println!("\n=== Results for '{query}' ===\n");
            for (i, portrait) in retrieval.portraits.iter().enumerate() {
                println!("#{} (score: {:.4}) {}", i + 1, retrieval.scores[i], portrait.fulllength_path);
                println!("   {}", preview(&portrait.description, 200));
                if evidence {
                    for hit in &retrieval.evidence[i] {
                        println!(
                            "   [{:.4}] '{}' matched '{}'",
                            hit.similarity,
                            hit.query_text.as_deref().unwrap_or_default(),
                            preview(&hit.embedded_text, 120)
                        );
                    }
                }
                println!();
            }
        }

        Commands::ValidateDatasets { datasets } => {
            for name in datasets {
                let dataset = load_dataset(&settings.dataset_root, &name)?;
                validate_dataset(&dataset, &settings.portraits_root)?;
                let queries: usize = dataset.iter().map(|e| e.queries.len()).sum();
                println!("{name}: {} entries, {queries} queries OK", dataset.len());
            }
        }

        Commands::Evaluate { dataset, k, report } => {
            let backend = open(&settings).await?;
            let retriever = settings.retriever(&backend)?;
            let judge = Judge::from_experiment_dir(retriever, &settings.dataset_root, &dataset)?
                .with_limit(k);

            let outcomes = judge.evaluate_detailed().await?;
            let scores = judge::score(&outcomes);
            for (metric, score) in &scores {
                println!("{metric}: {score:.4}");
            }

            if let Some(path) = report {
                let report = Report {
                    dataset: &dataset,
                    splitter: settings.splitter_type,
                    embedder: settings.embedder_type,
                    distance: settings.distance,
                    scores: &scores,
                    outcomes: &outcomes,
                };
                fs::write(&path, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), "wrote report");
            }
        }

        Commands::Experiments { k } => {
            let mut rows = Vec::new();
            for experiment in experiments() {
                println!("Running experiment: {}", experiment.description);
                let settings = settings.for_experiment(&experiment);
                let backend = open(&settings).await?;
                let retriever = settings.retriever(&backend)?;
                let judge =
                    Judge::from_experiment_dir(retriever, &settings.dataset_root, experiment.dataset)?
                        .with_limit(k);

                let result = judge.evaluate().await?;
                println!("{}", serde_json::to_string(&result)?);
                rows.push((experiment.description.to_string(), result));
            }

            println!("\nAll experiments");
            println!("---------------");
            print_table(&rows);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_settings_from_args() {
        let cli = Cli::try_parse_from([
            "portrait-search",
            "--splitter",
            "combine-lchunk-160-o40-and-lchunk-120-o60",
            "--embedder",
            "all-MiniLM-L6-v2",
            "--distance",
            "cosine",
            "--natural-dimension",
            "search",
            "elf",
        ])
        .unwrap();
        let settings = cli.settings.into_settings().unwrap();

        assert_eq!(settings.splitter_type, SplitterType::Combined160Overlap40And120Overlap60);
        assert_eq!(settings.embedder_type, EmbedderType::AllMiniLmL6V2);
        assert_eq!(settings.distance, DistanceType::Cosine);
        assert_eq!(settings.embedding_dimension, None);
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut cli =
            Cli::try_parse_from(["portrait-search", "--backend", "postgres", "experiments"]).unwrap();
        // ignore a DATABASE_URL from the environment
        cli.settings.database_url = None;
        assert!(cli.settings.into_settings().is_err());

        let cli = Cli::try_parse_from([
            "portrait-search",
            "--backend",
            "postgres",
            "--database-url",
            "postgres://localhost/portraits",
            "experiments",
        ])
        .unwrap();
        assert_eq!(
            cli.settings.into_settings().unwrap().backend,
            BackendConfig::Postgres {
                url: "postgres://localhost/portraits".into()
            }
        );
    }

    #[test]
    fn test_unknown_splitter_rejected() {
        assert!(Cli::try_parse_from(["portrait-search", "--splitter", "paragraph", "experiments"]).is_err());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("élan vital", 4), "élan...");
    }
}
