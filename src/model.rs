// BERT encoder for sequence classification, built from burn's stock layers so that the weights of
// a pretrained Hugging Face checkpoint can be loaded into it. The encoder (embeddings, transformer
// stack, pooler) comes from the checkpoint; the linear classification head is always fresh.

use crate::data_processing::{
    Language, TextClassificationInferenceBatch, TextClassificationTrainingBatch,
};
use crate::error::{Error, Result};
use burn::{
    config::Config,
    module::Module,
    nn::{
        loss::CrossEntropyLossConfig,
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear,
        LinearConfig,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Bool, Int, Tensor},
    train::ClassificationOutput,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// Hugging Face parameter names -> module paths of BertModel.
const HF_KEY_REMAP: [(&str, &str); 11] = [
    (r"^bert\.embeddings\.LayerNorm\.", "embeddings.layer_norm."),
    (r"^bert\.embeddings\.", "embeddings."),
    (
        r"^bert\.encoder\.layer\.([0-9]+)\.attention\.self\.(query|key|value)\.",
        "encoder.layers.$1.mha.$2.",
    ),
    (
        r"^bert\.encoder\.layer\.([0-9]+)\.attention\.output\.dense\.",
        "encoder.layers.$1.mha.output.",
    ),
    (
        r"^bert\.encoder\.layer\.([0-9]+)\.attention\.output\.LayerNorm\.",
        "encoder.layers.$1.norm_1.",
    ),
    (
        r"^bert\.encoder\.layer\.([0-9]+)\.intermediate\.dense\.",
        "encoder.layers.$1.pwff.linear_inner.",
    ),
    (
        r"^bert\.encoder\.layer\.([0-9]+)\.output\.dense\.",
        "encoder.layers.$1.pwff.linear_outer.",
    ),
    (
        r"^bert\.encoder\.layer\.([0-9]+)\.output\.LayerNorm\.",
        "encoder.layers.$1.norm_2.",
    ),
    (r"^bert\.pooler\.dense\.", "pooler."),
    // Older checkpoints name the layer norm parameters gamma/beta.
    (r"\.gamma$", ".weight"),
    (r"\.beta$", ".bias"),
];

#[derive(Config, Debug)]
pub struct BertModelConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
}

// Subset of a Hugging Face `config.json`.
#[derive(Debug, Deserialize)]
struct HfBertConfig {
    vocab_size: usize,
    hidden_size: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
    intermediate_size: usize,
    #[serde(default = "default_max_position_embeddings")]
    max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    type_vocab_size: usize,
    #[serde(default = "default_dropout")]
    hidden_dropout_prob: f64,
    #[serde(default = "default_layer_norm_eps")]
    layer_norm_eps: f64,
}

fn default_max_position_embeddings() -> usize {
    512
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_dropout() -> f64 {
    0.1
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

impl BertModelConfig {
    /// Parses a Hugging Face `config.json`.
    pub fn from_hf_json(json: &str) -> Result<Self> {
        let hf: HfBertConfig = serde_json::from_str(json)?;
        Ok(Self::new(
            hf.vocab_size,
            hf.hidden_size,
            hf.num_hidden_layers,
            hf.num_attention_heads,
            hf.intermediate_size,
        )
        .with_max_position_embeddings(hf.max_position_embeddings)
        .with_type_vocab_size(hf.type_vocab_size)
        .with_hidden_dropout_prob(hf.hidden_dropout_prob)
        .with_layer_norm_eps(hf.layer_norm_eps))
    }

    /// Randomly initialised encoder.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertModel<B> {
        let embeddings = BertEmbeddings {
            word_embeddings: EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            position_embeddings: EmbeddingConfig::new(
                self.max_position_embeddings,
                self.hidden_size,
            )
            .init(device),
            token_type_embeddings: EmbeddingConfig::new(self.type_vocab_size, self.hidden_size)
                .init(device),
            layer_norm: LayerNormConfig::new(self.hidden_size)
                .with_epsilon(self.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(self.hidden_dropout_prob).init(),
        };

        let encoder = TransformerEncoderConfig::new(
            self.hidden_size,
            self.intermediate_size,
            self.num_attention_heads,
            self.num_hidden_layers,
        )
        .with_dropout(self.hidden_dropout_prob)
        .init(device);

        BertModel {
            embeddings,
            encoder,
            pooler: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
        }
    }

    /// Encoder initialised from a PyTorch `pytorch_model.bin` checkpoint.
    pub fn init_pretrained<B: Backend>(
        &self,
        weights: &Path,
        device: &B::Device,
    ) -> Result<BertModel<B>> {
        let args = HF_KEY_REMAP.iter().fold(
            LoadArgs::new(weights.to_path_buf()),
            |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
        );

        let record: BertModelRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .map_err(|e| Error::Weights(format!("'{}': {e}", weights.display())))?;

        Ok(self.init(device).load_record(record))
    }
}

/// Local paths of a pretrained checkpoint.
#[derive(Debug, Clone)]
pub struct PretrainedFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
}

impl PretrainedFiles {
    /// Downloads the checkpoint of `language` into `cache_dir` unless it is already cached.
    pub fn fetch(language: Language, cache_dir: &Path) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_progress(false)
            .build()?;
        let repo = api.repo(Repo::new(language.model_id().to_string(), RepoType::Model));

        Ok(Self {
            config: repo.get("config.json")?,
            weights: repo.get("pytorch_model.bin")?,
        })
    }

    pub fn model_config(&self) -> Result<BertModelConfig> {
        BertModelConfig::from_hf_json(&std::fs::read_to_string(&self.config)?)
    }
}

#[derive(Module, Debug)]
pub struct BertEmbeddings<B: Backend> {
    word_embeddings: Embedding<B>,
    position_embeddings: Embedding<B>,
    token_type_embeddings: Embedding<B>,
    layer_norm: LayerNorm<B>,
    dropout: Dropout,
}

impl<B: Backend> BertEmbeddings<B> {
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_length] = tokens.dims();
        let device = tokens.device();

        let positions = Tensor::arange(0..seq_length as i64, &device)
            .reshape([1, seq_length])
            .repeat(0, batch_size);
        // Single-segment input: every token belongs to segment 0.
        let token_types = Tensor::<B, 2, Int>::zeros([batch_size, seq_length], &device);

        let embedding = self.word_embeddings.forward(tokens)
            + self.position_embeddings.forward(positions)
            + self.token_type_embeddings.forward(token_types);

        self.dropout.forward(self.layer_norm.forward(embedding))
    }
}

#[derive(Module, Debug)]
pub struct BertModel<B: Backend> {
    embeddings: BertEmbeddings<B>,
    encoder: TransformerEncoder<B>,
    pooler: Linear<B>,
}

impl<B: Backend> BertModel<B> {
    /// Longest sequence the position table covers.
    pub fn max_position_embeddings(&self) -> usize {
        self.embeddings.position_embeddings.weight.val().dims()[0]
    }

    pub fn vocab_size(&self) -> usize {
        self.embeddings.word_embeddings.weight.val().dims()[0]
    }

    /// Pooled `[CLS]` representation, shape `[batch_size, hidden_size]`.
    pub fn forward(&self, tokens: Tensor<B, 2, Int>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
        let [batch_size, _] = tokens.dims();

        let embedding = self.embeddings.forward(tokens);
        let encoded = self
            .encoder
            .forward(TransformerEncoderInput::new(embedding).mask_pad(mask_pad));

        let [_, _, hidden_size] = encoded.dims();
        let cls = encoded
            .slice([0..batch_size, 0..1])
            .reshape([batch_size, hidden_size]);

        self.pooler.forward(cls).tanh()
    }
}

#[derive(Config, Debug)]
pub struct BertClassificationConfig {
    pub bert: BertModelConfig,
    pub num_labels: usize,
    #[config(default = 0.1)]
    pub classifier_dropout: f64,
}

impl BertClassificationConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertForSequenceClassification<B> {
        self.init_with_encoder(self.bert.init(device), device)
    }

    /// Attaches a fresh head of `num_labels` outputs to an existing encoder.
    pub fn init_with_encoder<B: Backend>(
        &self,
        bert: BertModel<B>,
        device: &B::Device,
    ) -> BertForSequenceClassification<B> {
        BertForSequenceClassification {
            bert,
            dropout: DropoutConfig::new(self.classifier_dropout).init(),
            classifier: LinearConfig::new(self.bert.hidden_size, self.num_labels).init(device),
            num_labels: self.num_labels,
        }
    }
}

#[derive(Module, Debug)]
pub struct BertForSequenceClassification<B: Backend> {
    bert: BertModel<B>,
    dropout: Dropout,
    classifier: Linear<B>,
    num_labels: usize,
}

impl<B: Backend> BertForSequenceClassification<B> {
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn max_position_embeddings(&self) -> usize {
        self.bert.max_position_embeddings()
    }

    pub fn vocab_size(&self) -> usize {
        self.bert.vocab_size()
    }

    /// Unnormalised class scores, shape `[batch_size, num_labels]`.
    pub fn logits(&self, tokens: Tensor<B, 2, Int>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
        let pooled = self.bert.forward(tokens, mask_pad);
        self.classifier.forward(self.dropout.forward(pooled))
    }

    /// Forward pass with the cross-entropy loss, used for training
    pub fn forward(&self, item: TextClassificationTrainingBatch<B>) -> ClassificationOutput<B> {
        let output = self.logits(item.tokens, item.mask_pad);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), item.labels.clone());

        ClassificationOutput {
            loss,
            output,
            targets: item.labels,
        }
    }

    /// Predicted label of every row of the batch.
    pub fn inference(&self, item: TextClassificationInferenceBatch<B>) -> Tensor<B, 1, Int> {
        let [batch_size, _] = item.tokens.dims();
        self.logits(item.tokens, item.mask_pad)
            .argmax(1)
            .reshape([batch_size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Data, Shape};

    type TestBackend = NdArray<f32>;

    fn tiny_config() -> BertModelConfig {
        BertModelConfig::new(32, 8, 1, 2, 16).with_max_position_embeddings(16)
    }

    fn tokens(rows: usize, cols: usize) -> Tensor<TestBackend, 2, Int> {
        let values: Vec<i64> = (0..rows * cols).map(|i| (i % 32) as i64).collect();
        Tensor::from_data(Data::new(values, Shape::new([rows, cols])), &Default::default())
    }

    #[test]
    fn pooled_output_has_hidden_size() {
        let device = Default::default();
        let bert = tiny_config().init::<TestBackend>(&device);
        let mask = tokens(3, 5).equal_elem(-1);

        let pooled = bert.forward(tokens(3, 5), mask);

        assert_eq!(pooled.dims(), [3, 8]);
    }

    #[test]
    fn classifier_produces_one_logit_per_label() {
        let device = Default::default();
        let model = BertClassificationConfig::new(tiny_config(), 5).init::<TestBackend>(&device);
        let mask = tokens(2, 4).equal_elem(-1);

        let logits = model.logits(tokens(2, 4), mask);

        assert_eq!(logits.dims(), [2, 5]);
        assert_eq!(model.num_labels(), 5);
        assert_eq!(model.max_position_embeddings(), 16);
        assert_eq!(model.vocab_size(), 32);
    }

    #[test]
    fn parses_hugging_face_config() {
        let json = r#"{
            "architectures": ["BertForMaskedLM"],
            "attention_probs_dropout_prob": 0.1,
            "hidden_size": 768,
            "intermediate_size": 3072,
            "max_position_embeddings": 512,
            "model_type": "bert",
            "num_attention_heads": 12,
            "num_hidden_layers": 12,
            "type_vocab_size": 2,
            "vocab_size": 119547
        }"#;

        let config = BertModelConfig::from_hf_json(json).unwrap();

        assert_eq!(config.vocab_size, 119547);
        assert_eq!(config.num_hidden_layers, 12);
        assert_eq!(config.layer_norm_eps, 1e-12);
        assert_eq!(config.hidden_dropout_prob, 0.1);
    }
}
