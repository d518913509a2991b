// This module defines the Tokenizer trait, the common interface of the wordpiece tokenizers used
// by the classifier, and BertTokenizer, its implementation on top of the `tokenizers` library with
// the vocabulary of a pretrained BERT checkpoint. TokenizerAdapter turns raw text into the
// fixed-length token id and attention mask rows the model consumes.

use crate::error::{Error, Result};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// Languages with a pretrained BERT vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Language {
    #[strum(to_string = "english", serialize = "en")]
    English,
    #[strum(to_string = "chinese", serialize = "zh")]
    Chinese,
    #[strum(to_string = "multilingual", serialize = "arabic", serialize = "ar")]
    Multilingual,
}

impl Language {
    pub fn parse(value: &str) -> Result<Self> {
        Self::from_str(value.trim()).map_err(|_| Error::UnsupportedLanguage(value.to_string()))
    }

    /// Hugging Face repository holding the vocabulary and weights.
    pub fn model_id(self) -> &'static str {
        match self {
            Language::English => "bert-base-uncased",
            Language::Chinese => "bert-base-chinese",
            Language::Multilingual => "bert-base-multilingual-cased",
        }
    }
}

pub trait Tokenizer: Send + Sync {
    /// Converts text into content token ids, without boundary tokens.
    fn encode(&self, value: &str) -> Result<Vec<u32>>;

    fn vocab_size(&self) -> usize;

    /// Token used to pad sequences to the same length.
    fn pad_token(&self) -> u32;

    /// Token prepended to every sequence.
    fn start_token(&self) -> u32;

    /// Token appended to every sequence.
    fn end_token(&self) -> u32;
}

/// BERT wordpiece tokenizer loaded from a `tokenizer.json` file.
pub struct BertTokenizer {
    tokenizer: tokenizers::Tokenizer,
    pad: u32,
    cls: u32,
    sep: u32,
}

impl BertTokenizer {
    /// Fetches the vocabulary of `language` into `cache_dir` unless already cached.
    pub fn from_pretrained(language: Language, cache_dir: &Path) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_progress(false)
            .build()?;
        let path = api
            .repo(Repo::new(language.model_id().to_string(), RepoType::Model))
            .get("tokenizer.json")?;

        tracing::info!("Loading {language} vocabulary from '{}'", path.display());
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            Error::Tokenization(format!("cannot load '{}': {e}", path.display()))
        })?;
        Self::new(tokenizer)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_str(json)
            .map_err(|e| Error::Tokenization(format!("invalid tokenizer definition: {e}")))?;
        Self::new(tokenizer)
    }

    fn new(mut tokenizer: tokenizers::Tokenizer) -> Result<Self> {
        // Padding and truncation are applied by TokenizerAdapter.
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| Error::Tokenization(e.to_string()))?;

        let special = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| Error::Tokenization(format!("vocabulary has no '{token}' token")))
        };
        let pad = special("[PAD]")?;
        let cls = special("[CLS]")?;
        let sep = special("[SEP]")?;

        Ok(Self {
            tokenizer,
            pad,
            cls,
            sep,
        })
    }
}

impl Tokenizer for BertTokenizer {
    fn encode(&self, value: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(value, false)
            .map_err(|e| Error::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    fn pad_token(&self) -> u32 {
        self.pad
    }

    fn start_token(&self) -> u32 {
        self.cls
    }

    fn end_token(&self) -> u32 {
        self.sep
    }
}

/// Fixed-length encoding of one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedText {
    pub token_ids: Vec<u32>,  // [CLS] content [SEP] [PAD]...
    pub input_mask: Vec<u32>, // 1 for real and boundary tokens, 0 for padding
}

/// Parallel token id and mask rows of a whole split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoded {
    pub token_ids: Vec<Vec<u32>>,
    pub input_mask: Vec<Vec<u32>>,
}

impl Encoded {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// Pads or truncates every text to exactly `max_len` tokens.
#[derive(Clone)]
pub struct TokenizerAdapter {
    tokenizer: Arc<dyn Tokenizer>,
    max_len: usize,
}

impl TokenizerAdapter {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_len: usize) -> Result<Self> {
        if max_len < 2 {
            return Err(Error::InvalidConfig(format!(
                "max sequence length must leave room for the two boundary tokens, got {max_len}"
            )));
        }
        Ok(Self { tokenizer, max_len })
    }

    /// Resolves the language before anything is downloaded or tokenized.
    pub fn from_pretrained(language: &str, cache_dir: &Path, max_len: usize) -> Result<Self> {
        let language = Language::parse(language)?;
        let tokenizer = BertTokenizer::from_pretrained(language, cache_dir)?;
        Self::new(Arc::new(tokenizer), max_len)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.vocab_size()
    }

    pub fn encode(&self, text: &str) -> Result<TokenizedText> {
        let mut content = self.tokenizer.encode(text)?;
        content.truncate(self.max_len - 2);

        let mut token_ids = Vec::with_capacity(self.max_len);
        token_ids.push(self.tokenizer.start_token());
        token_ids.extend_from_slice(&content);
        token_ids.push(self.tokenizer.end_token());

        let mut input_mask = vec![1; token_ids.len()];
        token_ids.resize(self.max_len, self.tokenizer.pad_token());
        input_mask.resize(self.max_len, 0);

        Ok(TokenizedText {
            token_ids,
            input_mask,
        })
    }

    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Encoded> {
        let mut encoded = Encoded {
            token_ids: Vec::with_capacity(texts.len()),
            input_mask: Vec::with_capacity(texts.len()),
        };

        for text in texts {
            let TokenizedText {
                token_ids,
                input_mask,
            } = self.encode(text.as_ref())?;
            encoded.token_ids.push(token_ids);
            encoded.input_mask.push(input_mask);
        }

        tracing::debug!("Tokenized {} texts to length {}", encoded.len(), self.max_len);
        Ok(encoded)
    }
}
