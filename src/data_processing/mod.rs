mod batcher;
mod dataset;
mod splitter;
mod tokenizer;

pub use batcher::*;
pub use dataset::*;
pub use splitter::*;
pub use tokenizer::*;
