// BertClassifier owns a pretrained BERT encoder with a linear classification head and exposes the
// fit/predict pair used by the pipeline. Training lives in training.rs, prediction in inference.rs.

use crate::data_processing::Language;
use crate::error::{Error, Result};
use crate::model::{
    BertClassificationConfig, BertForSequenceClassification, BertModelConfig, PretrainedFiles,
};
use burn::{config::Config, tensor::backend::AutodiffBackend};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    /// Fresh head, not fitted on this task yet.
    Untrained,
    /// Fitted for `epochs` passes in total.
    Trained { epochs: usize },
}

/// Optimisation settings used by `fit`.
#[derive(Config, Debug)]
pub struct FitOptions {
    #[config(default = 2e-5)]
    pub learning_rate: f64,
    /// Share of the optimisation steps spent warming the learning rate up.
    #[config(default = 0.1)]
    pub warmup_proportion: f64,
    #[config(default = 0.01)]
    pub weight_decay: f32,
    /// Steps between two running-loss reports.
    #[config(default = 10)]
    pub log_interval: usize,
    /// Seed of the mini-batch shuffling.
    #[config(default = 42)]
    pub seed: u64,
}

pub struct BertClassifier<B: AutodiffBackend> {
    pub(crate) model: BertForSequenceClassification<B>,
    pub(crate) options: FitOptions,
    pub(crate) state: ClassifierState,
    pub(crate) device: B::Device,
}

impl<B: AutodiffBackend> BertClassifier<B> {
    /// Loads the pretrained checkpoint of `language` (downloading it into `cache_dir` when missing)
    /// and attaches a fresh head sized to `num_labels`.
    pub fn pretrained(
        language: &str,
        num_labels: usize,
        cache_dir: &Path,
        device: B::Device,
    ) -> Result<Self> {
        let language = Language::parse(language)?;
        check_num_labels(num_labels)?;
        std::fs::create_dir_all(cache_dir)?;

        let files = PretrainedFiles::fetch(language, cache_dir)?;
        let bert_config = files.model_config()?;
        tracing::info!(
            "Loading {} weights ({} layers, hidden size {})",
            language.model_id(),
            bert_config.num_hidden_layers,
            bert_config.hidden_size
        );

        let bert = bert_config.init_pretrained::<B>(&files.weights, &device)?;
        let model = BertClassificationConfig::new(bert_config, num_labels)
            .init_with_encoder(bert, &device);

        Ok(Self::from_model(model, device))
    }

    /// Randomly initialised encoder and head.
    pub fn from_config(config: BertModelConfig, num_labels: usize, device: B::Device) -> Result<Self> {
        check_num_labels(num_labels)?;
        let model = BertClassificationConfig::new(config, num_labels).init(&device);
        Ok(Self::from_model(model, device))
    }

    fn from_model(model: BertForSequenceClassification<B>, device: B::Device) -> Self {
        Self {
            model,
            options: FitOptions::new(),
            state: ClassifierState::Untrained,
            device,
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    pub fn num_labels(&self) -> usize {
        self.model.num_labels()
    }

    /// Longest token row the encoder accepts.
    pub fn max_seq_length(&self) -> usize {
        self.model.max_position_embeddings()
    }

    pub fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    /// Rows longer than the position table would index past it.
    pub(crate) fn check_sequence_length(&self, token_ids: &[Vec<u32>]) -> Result<()> {
        let max = self.max_seq_length();
        match token_ids.first().map(Vec::len) {
            Some(seq_length) if seq_length > max => Err(Error::InvalidConfig(format!(
                "rows of {seq_length} tokens exceed the {max} positions of the encoder"
            ))),
            _ => Ok(()),
        }
    }
}

fn check_num_labels(num_labels: usize) -> Result<()> {
    if num_labels == 0 {
        return Err(Error::InvalidConfig("classifier needs at least one label".to_string()));
    }
    Ok(())
}

pub(crate) fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch size must be positive".to_string()));
    }
    Ok(())
}

/// Token and mask rows must pair up and share one sequence length.
pub(crate) fn check_shapes(token_ids: &[Vec<u32>], input_mask: &[Vec<u32>]) -> Result<()> {
    if token_ids.len() != input_mask.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} token rows but {} mask rows",
            token_ids.len(),
            input_mask.len()
        )));
    }

    let Some(seq_length) = token_ids.first().map(Vec::len) else {
        return Ok(());
    };

    for (row, (ids, mask)) in token_ids.iter().zip(input_mask).enumerate() {
        if ids.len() != seq_length || mask.len() != seq_length {
            return Err(Error::ShapeMismatch(format!(
                "row {row} has {} tokens and {} mask values, expected {seq_length}",
                ids.len(),
                mask.len()
            )));
        }
    }
    Ok(())
}

/// Runs one batch step, turning a backend allocation failure into `ResourceExhausted`.
///
/// Only backends that panic when an allocation fails (LibTorch, wgpu) are covered. On the
/// ndarray backend a failed host allocation aborts the process and never reaches this guard.
pub(crate) fn guard_resources<T>(batch_size: usize, step: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(step)).or_else(|payload| {
        let detail = payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_default();

        let lowered = detail.to_lowercase();
        if lowered.contains("out of memory") || lowered.contains("allocat") {
            Err(Error::ResourceExhausted { batch_size, detail })
        } else {
            panic::resume_unwind(payload)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_check_accepts_matching_rows() {
        let ids = vec![vec![2, 5, 3], vec![2, 3, 0]];
        let mask = vec![vec![1, 1, 1], vec![1, 1, 0]];
        assert!(check_shapes(&ids, &mask).is_ok());
        assert!(check_shapes(&[], &[]).is_ok());
    }

    #[test]
    fn shape_check_rejects_row_count_mismatch() {
        let ids = vec![vec![2, 3], vec![2, 3]];
        let mask = vec![vec![1, 1]];
        assert!(matches!(check_shapes(&ids, &mask), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn shape_check_rejects_ragged_rows() {
        let ids = vec![vec![2, 3, 0], vec![2, 3]];
        let mask = vec![vec![1, 1, 0], vec![1, 1]];
        assert!(matches!(check_shapes(&ids, &mask), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn allocation_panics_become_resource_errors() {
        let result: Result<()> = guard_resources(64, || panic!("CUDA out of memory"));
        assert!(matches!(
            result,
            Err(Error::ResourceExhausted { batch_size: 64, .. })
        ));
    }

    #[test]
    fn other_panics_propagate() {
        let caught =
            panic::catch_unwind(|| guard_resources::<()>(1, || panic!("index out of bounds")));
        assert!(caught.is_err());
    }

    #[test]
    fn fit_options_default_to_bert_fine_tuning_values() {
        let options = FitOptions::new();
        assert_eq!(options.learning_rate, 2e-5);
        assert_eq!(options.warmup_proportion, 0.1);
        assert_eq!(options.log_interval, 10);
        assert_eq!(options.seed, 42);
    }
}
