// ArabicNewsDataset is the labelled corpus of Arabic news articles used for topic classification.
// The corpus is a CSV file with a `text` column and an integer `label` column that lives in the
// data directory. When the file is absent it is fetched once from a Hugging Face dataset
// repository; later loads read the local copy without touching the network. The label schema
// (five topics) is not part of the raw data and is described by the ArabicNewsClasses enum.

use crate::error::{Error, Result};
use burn::data::dataset::{Dataset, InMemDataset};
use derive_new::new;
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{Display, EnumCount, EnumIter};

/// One labelled article.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct NewsItem {
    pub text: String, // Article body
    pub label: usize, // Index into the label schema
}

/// Datasets that know their label schema.
pub trait TextClassificationDataset: Dataset<NewsItem> {
    fn num_classes() -> usize;

    fn class_name(label: usize) -> Option<String>;

    /// Class names ordered by label.
    fn class_names() -> Vec<String> {
        (0..Self::num_classes()).filter_map(Self::class_name).collect()
    }
}

// Raw CSV row. Empty text cells deserialize to None.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct NewsRecord {
    text: Option<String>,
    label: usize,
}

/// Where the corpus file comes from.
#[derive(new, Clone, Debug)]
pub struct DatasetSource {
    pub file_name: String,    // File name inside the data directory
    pub repo: Option<String>, // Hugging Face dataset repository to fetch from when absent
}

#[derive(Debug)]
pub struct ArabicNewsDataset {
    dataset: InMemDataset<NewsItem>,
}

impl Dataset<NewsItem> for ArabicNewsDataset {
    fn get(&self, index: usize) -> Option<NewsItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl ArabicNewsDataset {
    /// Loads the corpus from `data_dir`, fetching it first if it is not there yet.
    pub fn load(data_dir: impl AsRef<Path>, source: &DatasetSource) -> Result<Self> {
        let path = ensure_local_copy(data_dir.as_ref(), source)?;
        Self::from_csv(&path)
    }

    /// Reads a `text,label` CSV file with a header row.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(true);

        let records: InMemDataset<NewsRecord> = InMemDataset::from_csv(path, &builder)
            .map_err(|e| {
                Error::DataUnavailable(format!("cannot read '{}': {e}", path.display()))
            })?;

        let items = records
            .iter()
            .map(|record| {
                if record.label >= Self::num_classes() {
                    return Err(Error::InvalidLabel {
                        label: record.label,
                        num_classes: Self::num_classes(),
                    });
                }
                Ok(NewsItem::new(record.text.unwrap_or_default(), record.label))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Loaded {} rows from '{}'", items.len(), path.display());
        Ok(Self::from_items(items))
    }

    pub fn from_items(items: Vec<NewsItem>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Rows in file order.
    pub fn into_items(self) -> Vec<NewsItem> {
        self.dataset.iter().collect()
    }
}

fn ensure_local_copy(data_dir: &Path, source: &DatasetSource) -> Result<PathBuf> {
    let path = data_dir.join(&source.file_name);
    if path.exists() {
        tracing::debug!("Using local corpus '{}'", path.display());
        return Ok(path);
    }

    let Some(repo) = source.repo.as_ref() else {
        return Err(Error::DataUnavailable(format!(
            "'{}' does not exist and no dataset repository is configured",
            path.display()
        )));
    };

    tracing::info!("Fetching '{}' from dataset repository '{repo}'", source.file_name);
    let unavailable = |e: &dyn std::fmt::Display| {
        Error::DataUnavailable(format!("cannot fetch '{}' from '{repo}': {e}", source.file_name))
    };

    fs::create_dir_all(data_dir).map_err(|e| unavailable(&e))?;
    let api = ApiBuilder::new()
        .with_cache_dir(data_dir.join(".hf-cache"))
        .with_progress(false)
        .build()
        .map_err(|e| unavailable(&e))?;
    let cached = api
        .repo(Repo::new(repo.clone(), RepoType::Dataset))
        .get(&source.file_name)
        .map_err(|e| unavailable(&e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| unavailable(&e))?;
    }
    fs::copy(&cached, &path).map_err(|e| unavailable(&e))?;
    Ok(path)
}

/// Topics of the Arabic news corpus, ordered by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumCount, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArabicNewsClasses {
    Culture,
    Diverse,
    Economy,
    Politic,
    Sport,
}

impl ArabicNewsClasses {
    pub fn from_label(label: usize) -> Option<Self> {
        Self::iter().nth(label)
    }

    pub fn label(self) -> usize {
        self as usize
    }
}

impl TextClassificationDataset for ArabicNewsDataset {
    fn num_classes() -> usize {
        ArabicNewsClasses::COUNT
    }

    fn class_name(label: usize) -> Option<String> {
        ArabicNewsClasses::from_label(label).map(|class| class.to_string())
    }
}
