pub mod classifier;
pub mod data_processing;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod pipeline;

mod inference;
mod training;

pub use classifier::{BertClassifier, ClassifierState, FitOptions};
pub use data_processing::{ArabicNewsClasses, ArabicNewsDataset, TextClassificationDataset};
pub use error::{Error, Result};
pub use evaluation::{evaluate, ClassificationReport};
pub use pipeline::PipelineConfig;
