//! End to end: portraits -> embeddings -> retriever -> judge, on the memory store.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use portrait_search_lib::embed::{Embedder, EmbedderType, Embedding};
use portrait_search_lib::index::generate_embeddings;
use portrait_search_lib::portrait::{PortraitId, PortraitRecord, PortraitStore};
use portrait_search_lib::quality::{
    load_dataset, store_dataset, validate_dataset, DatasetEntry, Judge, PortraitMatch, Query,
};
use portrait_search_lib::retrieve::{Retriever, SimilarityRetriever};
use portrait_search_lib::split::SplitterType;
use portrait_search_lib::store::{DistanceType, EmbeddingStore, MemoryStore};

const VOCABULARY: [&str; 9] = [
    "elf", "dwarf", "orc", "ranger", "warrior", "shaman", "bow", "axe", "staff",
];

/// Keyword counts over a fixed vocabulary.
struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed(&self, chunks: &[String]) -> portrait_search_lib::Result<Vec<Embedding>> {
        Ok(chunks
            .iter()
            .map(|chunk| {
                let mut v = vec![0.0; VOCABULARY.len()];
                for word in chunk
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                {
                    if let Some(i) = VOCABULARY.iter().position(|w| *w == word) {
                        v[i] += 1.0;
                    }
                }
                v
            })
            .collect())
    }

    fn embedder_type(&self) -> EmbedderType {
        EmbedderType::AllMiniLmL6V2
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }
}

fn portrait(path: &str, description: &str) -> PortraitRecord {
    PortraitRecord {
        id: PortraitId::new(),
        fulllength_path: path.to_string(),
        medium_path: String::new(),
        small_path: String::new(),
        tags: Vec::new(),
        url: String::new(),
        hash: path.to_string(),
        query: String::new(),
        description: description.to_string(),
    }
}

fn tags(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn single_match_query(text: &str, path: &str, matches: &[&str]) -> Query {
    Query {
        query: text.to_string(),
        matches: tags(matches),
        portraits: vec![PortraitMatch {
            path: path.to_string(),
            matches: tags(matches),
        }],
    }
}

fn write_portrait_files(root: &Path, paths: &[&str]) {
    for path in paths {
        let file = root.join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, b"png").unwrap();
    }
}

async fn indexed_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for record in [
        portrait("elf/ranger.png", "An elf ranger holding a bow."),
        portrait("dwarf/warrior.png", "A dwarf warrior with an axe."),
        portrait("orc/shaman.png", "An orc shaman leaning on a staff."),
    ] {
        store.insert(record).await.unwrap();
    }

    let splitter = SplitterType::RecursiveChunk120Overlap60.splitter();
    let inserted = generate_embeddings(&*store, &*store, &splitter, &KeywordEmbedder, Some("v1"))
        .await
        .unwrap();
    assert_eq!(inserted, 3);
    store
}

fn retriever(store: &Arc<MemoryStore>) -> impl Retriever {
    SimilarityRetriever::new(
        SplitterType::RecursiveChunk120Overlap60.splitter(),
        KeywordEmbedder,
        store.clone(),
        store.clone(),
        DistanceType::Cosine,
    )
}

#[tokio::test]
async fn test_dataset_driven_evaluation() {
    let dataset_root = tempfile::tempdir().unwrap();
    let portraits_root = tempfile::tempdir().unwrap();
    let paths = ["elf/ranger.png", "dwarf/warrior.png", "orc/shaman.png"];
    write_portrait_files(portraits_root.path(), &paths);

    let entries = vec![
        DatasetEntry {
            name: "races".into(),
            queries: vec![
                single_match_query("elf with a bow", "elf/ranger.png", &["elf", "bow"]),
                single_match_query("dwarf with an axe", "dwarf/warrior.png", &["dwarf", "axe"]),
            ],
        },
        DatasetEntry {
            name: "casters".into(),
            queries: vec![single_match_query(
                "orc shaman",
                "orc/shaman.png",
                &["orc", "shaman"],
            )],
        },
    ];
    store_dataset(&entries, dataset_root.path(), "v1").unwrap();

    let loaded = load_dataset(dataset_root.path(), "v1").unwrap();
    assert_eq!(loaded.len(), 2);
    validate_dataset(&loaded, portraits_root.path()).unwrap();

    let store = indexed_store().await;
    let judge = Judge::from_experiment_dir(retriever(&store), dataset_root.path(), "v1")
        .unwrap()
        .with_limit(3);

    let outcomes = judge.evaluate_detailed().await.unwrap();
    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        assert_eq!(outcome.retrieved.len(), 3);
        assert_eq!(outcome.retrieved[0], outcome.expected[0].0, "{}", outcome.query);
    }

    let result = judge.evaluate().await.unwrap();
    // one fully relevant portrait among three retrieved, always ranked first
    assert!((result["precision@k"] - 1.0 / 3.0).abs() < 1e-9);
    assert!((result["mean_reciprocal_rank"] - 1.0).abs() < 1e-9);
    assert!((result["weighted_relevance_precision@k"] - 1.0 / 3.0).abs() < 1e-9);
    assert!((result["weighted_relevance_mean_reciprocal_rank"] - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_experiment_embeddings_are_isolated() {
    let store = indexed_store().await;
    let retriever = retriever(&store);

    let tagged = retriever.get_portraits("elf with a bow", Some("v1"), 2).await.unwrap();
    assert_eq!(tagged.portraits.len(), 2);
    assert_eq!(tagged.portraits[0].fulllength_path, "elf/ranger.png");
    assert_eq!(tagged.evidence[0][0].query_text.as_deref(), Some("elf with a bow"));

    let main_corpus = retriever.get_portraits("elf with a bow", None, 2).await.unwrap();
    assert!(main_corpus.portraits.is_empty());

    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_missing_portrait_file_fails_validation() {
    let portraits_root = tempfile::tempdir().unwrap();
    write_portrait_files(portraits_root.path(), &["elf/ranger.png"]);

    let entries = vec![DatasetEntry {
        name: "races".into(),
        queries: vec![single_match_query("orc shaman", "orc/shaman.png", &["orc", "shaman"])],
    }];

    let err = validate_dataset(&entries, portraits_root.path()).unwrap_err();
    assert!(err.to_string().contains("orc/shaman.png"));
}
