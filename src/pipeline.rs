// End-to-end run: load the corpus, split it, tokenize both halves, fine-tune the classifier on the
// train half, predict the test half and evaluate the predictions against the true labels.

use crate::classifier::{BertClassifier, FitOptions};
use crate::data_processing::{
    drop_empty_text, split_train_test, subsample, ArabicNewsDataset, DatasetSource, NewsItem,
    TextClassificationDataset, TokenizerAdapter,
};
use crate::error::{Error, Result};
use crate::evaluation::{evaluate, ClassificationReport};
use burn::{config::Config, tensor::backend::AutodiffBackend};
use std::path::Path;

#[derive(Config, Debug)]
pub struct PipelineConfig {
    /// Directory holding the corpus CSV
    #[config(default = "\"data\".to_string()")]
    pub data_dir: String,
    /// Cache for tokenizer files and pretrained weights
    #[config(default = "\".cache\".to_string()")]
    pub cache_dir: String,
    /// Language of the pretrained checkpoint (english, chinese, multilingual)
    #[config(default = "\"multilingual\".to_string()")]
    pub language: String,
    #[config(default = 128)]
    pub max_seq_length: usize,
    #[config(default = 16)]
    pub batch_size: usize,
    /// Data loader threads used by fit and predict
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 1)]
    pub num_epochs: usize,
    #[config(default = 0.8)]
    pub train_fraction: f64,
    /// Rows kept from the corpus before splitting
    #[config(default = 1000)]
    pub sample_size: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 2e-5)]
    pub learning_rate: f64,
    #[config(default = 0.1)]
    pub warmup_proportion: f64,
    #[config(default = 0.01)]
    pub weight_decay: f32,
    #[config(default = 10)]
    pub log_interval: usize,
    #[config(default = "\"arabic_news.csv\".to_string()")]
    pub dataset_file: String,
    /// Hugging Face dataset repository to fetch the corpus from when it is not on disk
    pub dataset_repo: Option<String>,
}

impl PipelineConfig {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions::new()
            .with_learning_rate(self.learning_rate)
            .with_warmup_proportion(self.warmup_proportion)
            .with_weight_decay(self.weight_decay)
            .with_log_interval(self.log_interval)
            .with_seed(self.seed)
    }

    pub fn dataset_source(&self) -> DatasetSource {
        DatasetSource::new(self.dataset_file.clone(), self.dataset_repo.clone())
    }
}

/// Runs the whole pipeline with the pretrained checkpoint of `config.language`.
pub fn run<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: B::Device,
) -> Result<ClassificationReport> {
    let cache_dir = Path::new(&config.cache_dir);

    // Unknown languages fail here, before the corpus is read.
    let adapter =
        TokenizerAdapter::from_pretrained(&config.language, cache_dir, config.max_seq_length)?;

    let dataset = ArabicNewsDataset::load(&config.data_dir, &config.dataset_source())?;

    let mut classifier = BertClassifier::<B>::pretrained(
        &config.language,
        ArabicNewsDataset::num_classes(),
        cache_dir,
        device,
    )?
    .with_options(config.fit_options());

    train_and_evaluate(config, dataset.into_items(), &adapter, &mut classifier)
}

/// Split, tokenize, fit, predict and evaluate with an already built tokenizer and classifier.
pub fn train_and_evaluate<B: AutodiffBackend>(
    config: &PipelineConfig,
    items: Vec<NewsItem>,
    adapter: &TokenizerAdapter,
    classifier: &mut BertClassifier<B>,
) -> Result<ClassificationReport> {
    check_compatible(adapter, classifier)?;

    let items = subsample(drop_empty_text(items), config.sample_size, config.seed);
    let (train, test) = split_train_test(items, config.train_fraction, config.seed)?;

    let (train_texts, train_labels) = unzip(train);
    let (test_texts, test_labels) = unzip(test);

    let train_encoded = adapter.encode_batch(&train_texts)?;
    let test_encoded = adapter.encode_batch(&test_texts)?;

    classifier.fit(
        &train_encoded.token_ids,
        &train_encoded.input_mask,
        &train_labels,
        config.num_workers,
        config.num_epochs,
        config.batch_size,
    )?;

    let predictions = classifier.predict(
        &test_encoded.token_ids,
        &test_encoded.input_mask,
        config.num_workers,
        config.batch_size,
    )?;

    let report = evaluate(
        &test_labels,
        &predictions,
        &ArabicNewsDataset::class_names(),
    )?;

    tracing::info!("Test accuracy: {:.4}", report.accuracy);
    for (name, metrics) in report.entries() {
        tracing::info!(
            "{name}: precision {:.4} recall {:.4} f1 {:.4} support {}",
            metrics.precision,
            metrics.recall,
            metrics.f1_score,
            metrics.support
        );
    }

    Ok(report)
}

// Encoded rows must fit the position table and every token id must have an embedding.
fn check_compatible<B: AutodiffBackend>(
    adapter: &TokenizerAdapter,
    classifier: &BertClassifier<B>,
) -> Result<()> {
    if adapter.max_len() > classifier.max_seq_length() {
        return Err(Error::InvalidConfig(format!(
            "max sequence length {} exceeds the {} positions of the encoder",
            adapter.max_len(),
            classifier.max_seq_length()
        )));
    }
    if adapter.vocab_size() > classifier.vocab_size() {
        return Err(Error::InvalidConfig(format!(
            "tokenizer vocabulary of {} ids exceeds the {} embeddings of the encoder",
            adapter.vocab_size(),
            classifier.vocab_size()
        )));
    }
    Ok(())
}

fn unzip(items: Vec<NewsItem>) -> (Vec<String>, Vec<usize>) {
    items.into_iter().map(|item| (item.text, item.label)).unzip()
}
