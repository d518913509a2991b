// The module defines TextClassificationTrainingBatch and TextClassificationInferenceBatch, the tensor
// batches used while fitting and predicting, and TextClassificationBatcher which builds them from
// rows that were already tokenized to a fixed length. Training items carry a label; inference items
// carry their row index instead, so predictions can be put back in input order when several loader
// workers deliver batches out of order.

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Bool, Data, Int, Shape, Tensor},
};
use derive_new::new;

/// Tokenized, labelled row.
#[derive(new, Clone, Debug)]
pub struct TrainingItem {
    pub token_ids: Vec<u32>,
    pub input_mask: Vec<u32>,
    pub label: usize,
}

/// Tokenized row to classify, with its position in the input.
#[derive(new, Clone, Debug)]
pub struct InferenceItem {
    pub index: usize,
    pub token_ids: Vec<u32>,
    pub input_mask: Vec<u32>,
}

#[derive(new, Clone)]
pub struct TextClassificationBatcher<B: Backend> {
    device: B::Device, // Device the batch tensors are created on
}

#[derive(Debug, Clone, new)]
pub struct TextClassificationTrainingBatch<B: Backend> {
    pub tokens: Tensor<B, 2, Int>,    // Token ids
    pub labels: Tensor<B, 1, Int>,    // Class labels
    pub mask_pad: Tensor<B, 2, Bool>, // true on padding positions
}

#[derive(Debug, Clone, new)]
pub struct TextClassificationInferenceBatch<B: Backend> {
    pub indices: Vec<usize>,          // Input row of each batch row
    pub tokens: Tensor<B, 2, Int>,    // Token ids
    pub mask_pad: Tensor<B, 2, Bool>, // true on padding positions
}

impl<B: Backend> TextClassificationBatcher<B> {
    fn stack(&self, rows: &[&[u32]]) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let seq_length = rows.first().map_or(0, |row| row.len());
        let values: Vec<i64> = rows
            .iter()
            .flat_map(|row| row.iter().map(|&value| value as i64))
            .collect();

        Tensor::from_data(
            Data::new(values, Shape::new([batch_size, seq_length])).convert::<B::IntElem>(),
            &self.device,
        )
    }

    // The encoder masks positions where mask_pad is true, i.e. where the attention mask is 0.
    fn padding_mask(&self, masks: &[&[u32]]) -> Tensor<B, 2, Bool> {
        self.stack(masks).equal_elem(0)
    }
}

impl<B: Backend> Batcher<TrainingItem, TextClassificationTrainingBatch<B>>
    for TextClassificationBatcher<B>
{
    fn batch(&self, items: Vec<TrainingItem>) -> TextClassificationTrainingBatch<B> {
        let tokens: Vec<&[u32]> = items.iter().map(|item| item.token_ids.as_slice()).collect();
        let masks: Vec<&[u32]> = items.iter().map(|item| item.input_mask.as_slice()).collect();
        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        let labels = Tensor::from_data(
            Data::new(labels, Shape::new([items.len()])).convert::<B::IntElem>(),
            &self.device,
        );

        TextClassificationTrainingBatch {
            tokens: self.stack(&tokens),
            labels,
            mask_pad: self.padding_mask(&masks),
        }
    }
}

impl<B: Backend> Batcher<InferenceItem, TextClassificationInferenceBatch<B>>
    for TextClassificationBatcher<B>
{
    fn batch(&self, items: Vec<InferenceItem>) -> TextClassificationInferenceBatch<B> {
        let tokens: Vec<&[u32]> = items.iter().map(|item| item.token_ids.as_slice()).collect();
        let masks: Vec<&[u32]> = items.iter().map(|item| item.input_mask.as_slice()).collect();

        TextClassificationInferenceBatch {
            indices: items.iter().map(|item| item.index).collect(),
            tokens: self.stack(&tokens),
            mask_pad: self.padding_mask(&masks),
        }
    }
}
