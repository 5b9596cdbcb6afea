//! Evaluation dataset
//!
//! A dataset lives in `<root>/<experiment>/` as one YAML file per entry:
//!
//! ```yaml
//! queries:
//!   - query: elf ranger with a bow
//!     match: [elf, ranger, bow]
//!     portraits:
//!       - path: elf/ranger-01/fulllength.png
//!         match: [elf, ranger, bow]
//!       - path: elf/scout-03/fulllength.png
//!         match: [elf, bow]
//! ```
//!
//! Every portrait's `match` set must be a subset of its query's `match` set,
//! and a path may appear only once per query.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// A portrait that satisfies a query, with the tags explaining why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortraitMatch {
    pub path: String,
    #[serde(rename = "match")]
    pub matches: BTreeSet<String>,
}

/// A labelled query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub query: String,
    #[serde(rename = "match")]
    pub matches: BTreeSet<String>,
    pub portraits: Vec<PortraitMatch>,
}

impl Query {
    pub fn add_portrait_match(&mut self, path: impl Into<String>, matches: BTreeSet<String>) {
        self.portraits.push(PortraitMatch {
            path: path.into(),
            matches,
        });
    }

    /// Check non-emptiness, subset and unique-path invariants.
    ///
    /// `entry` names the owning dataset entry in error messages.
    pub fn validate(&self, entry: &str) -> Result<()> {
        let fail = |portrait: &str, reason: String| Error::Dataset {
            entry: entry.to_string(),
            query: self.query.clone(),
            portrait: portrait.to_string(),
            reason,
        };

        if self.query.trim().is_empty() {
            return Err(fail("", "query text is empty".into()));
        }
        if self.matches.is_empty() {
            return Err(fail("", "query has no match tags".into()));
        }
        if self.portraits.is_empty() {
            return Err(fail("", "query has no portraits".into()));
        }

        let mut seen = HashSet::new();
        for portrait in &self.portraits {
            if portrait.path.is_empty() {
                return Err(fail("", "portrait path is empty".into()));
            }
            if portrait.matches.is_empty() {
                return Err(fail(&portrait.path, "portrait has no match tags".into()));
            }
            let extra: Vec<&str> = portrait
                .matches
                .difference(&self.matches)
                .map(String::as_str)
                .collect();
            if !extra.is_empty() {
                return Err(fail(
                    &portrait.path,
                    format!("match tags {extra:?} are not in the query's match tags"),
                ));
            }
            if !seen.insert(portrait.path.as_str()) {
                return Err(fail(&portrait.path, "portrait listed twice".into()));
            }
        }
        Ok(())
    }
}

/// A named group of queries, loaded from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// File stem; not part of the file contents
    #[serde(skip)]
    pub name: String,
    pub queries: Vec<Query>,
}

impl DatasetEntry {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Dataset {
                entry: String::new(),
                query: String::new(),
                portrait: String::new(),
                reason: "entry has no name".into(),
            });
        }
        if self.queries.is_empty() {
            return Err(Error::Dataset {
                entry: self.name.clone(),
                query: String::new(),
                portrait: String::new(),
                reason: "entry has no queries".into(),
            });
        }
        self.queries.iter().try_for_each(|q| q.validate(&self.name))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

/// Load and validate every entry of the dataset in `root/experiment`.
///
/// Entries are returned sorted by file name.
pub fn load_dataset(root: &Path, experiment: &str) -> Result<Vec<DatasetEntry>> {
    let dir = root.join(experiment);
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "dataset for '{experiment}' does not exist at {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for dir_entry in fs::read_dir(&dir)? {
        let path = dir_entry?.path();
        if path.is_file() && is_yaml(&path) {
            files.push(path);
        }
    }
    files.sort();

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut entry: DatasetEntry = serde_yaml::from_str(&fs::read_to_string(&path)?)
            .map_err(|err| Error::Dataset {
                entry: name.clone(),
                query: String::new(),
                portrait: String::new(),
                reason: format!("cannot parse {}: {err}", path.display()),
            })?;
        entry.name = name;
        entry.validate()?;
        debug!(entry = %entry.name, queries = entry.queries.len(), "loaded dataset entry");
        entries.push(entry);
    }

    info!(experiment, entries = entries.len(), "loaded dataset");
    Ok(entries)
}

/// Write every entry to `root/experiment/<name>.yaml`, creating the directory.
pub fn store_dataset(entries: &[DatasetEntry], root: &Path, experiment: &str) -> Result<()> {
    let dir = root.join(experiment);
    fs::create_dir_all(&dir)?;

    for entry in entries {
        entry.validate()?;
        fs::write(
            dir.join(format!("{}.yaml", entry.name)),
            serde_yaml::to_string(entry)?,
        )?;
    }
    Ok(())
}

/// Check invariants and that every referenced portrait exists under `portraits_root`.
pub fn validate_dataset(entries: &[DatasetEntry], portraits_root: &Path) -> Result<()> {
    for entry in entries {
        entry.validate()?;
        for query in &entry.queries {
            for portrait in &query.portraits {
                let local = portraits_root.join(&portrait.path);
                if !local.exists() {
                    return Err(Error::Dataset {
                        entry: entry.name.clone(),
                        query: query.query.clone(),
                        portrait: portrait.path.clone(),
                        reason: format!("file does not exist at {}", local.display()),
                    });
                }
            }
        }
    }
    Ok(())
}
