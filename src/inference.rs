// Prediction with the current weights. The autodiff model is turned into its inner-backend
// counterpart (no gradients, dropout disabled), rows are batched by burn's data loader and each
// batch row writes its argmax label back to its input position.

use crate::classifier::{
    check_batch_size, check_shapes, guard_resources, BertClassifier, ClassifierState,
};
use crate::data_processing::{InferenceItem, TextClassificationBatcher};
use crate::error::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::InMemDataset},
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};

impl<B: AutodiffBackend> BertClassifier<B> {
    /// Predicted label of every row, in input order. Does not modify the model.
    pub fn predict(
        &self,
        token_ids: &[Vec<u32>],
        input_mask: &[Vec<u32>],
        num_workers: usize,
        batch_size: usize,
    ) -> Result<Vec<usize>> {
        check_shapes(token_ids, input_mask)?;
        check_batch_size(batch_size)?;
        self.check_sequence_length(token_ids)?;
        if token_ids.is_empty() {
            return Ok(Vec::new());
        }
        if self.state == ClassifierState::Untrained {
            tracing::warn!("Predicting with a classification head that was never fitted");
        }

        let items: Vec<InferenceItem> = token_ids
            .iter()
            .zip(input_mask)
            .enumerate()
            .map(|(index, (ids, mask))| InferenceItem::new(index, ids.clone(), mask.clone()))
            .collect();

        let batcher = TextClassificationBatcher::<B::InnerBackend>::new(self.device.clone());
        let mut builder = DataLoaderBuilder::new(batcher).batch_size(batch_size);
        if num_workers > 0 {
            builder = builder.num_workers(num_workers);
        }
        let dataloader = builder.build(InMemDataset::new(items));

        let model = self.model.valid();
        let mut predictions = vec![0usize; token_ids.len()];

        for batch in dataloader.iter() {
            let indices = batch.indices.clone();
            let labels = guard_resources(batch_size, || model.inference(batch))?;
            let labels = labels.into_data().convert::<i64>().value;

            for (index, label) in indices.into_iter().zip(labels) {
                predictions[index] = label as usize;
            }
        }

        tracing::info!("Predicted {} rows", predictions.len());
        Ok(predictions)
    }
}
