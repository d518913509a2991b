// Fine-tuning of the classifier. Rows are wrapped into TrainingItems, batched by burn's data loader
// (shuffled with the configured seed, loaded by the requested number of worker threads) and fed to
// a hand-written optimisation loop: cross-entropy loss, AdamW with gradient norm clipping, and a
// learning rate that warms up linearly and then decays linearly to zero.

use crate::classifier::{
    check_batch_size, check_shapes, guard_resources, BertClassifier, ClassifierState,
};
use crate::data_processing::{TextClassificationBatcher, TrainingItem};
use crate::error::{Error, Result};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::InMemDataset},
    grad_clipping::GradientClippingConfig,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};

impl<B: AutodiffBackend> BertClassifier<B> {
    /// Trains the model in place for `num_epochs` passes over the rows.
    ///
    /// `num_workers` is the number of loader threads; 0 loads batches on the calling thread.
    /// Repeated calls continue from the current weights.
    pub fn fit(
        &mut self,
        token_ids: &[Vec<u32>],
        input_mask: &[Vec<u32>],
        labels: &[usize],
        num_workers: usize,
        num_epochs: usize,
        batch_size: usize,
    ) -> Result<()> {
        check_shapes(token_ids, input_mask)?;
        check_batch_size(batch_size)?;
        self.check_sequence_length(token_ids)?;
        if labels.len() != token_ids.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} token rows but {} labels",
                token_ids.len(),
                labels.len()
            )));
        }
        let num_labels = self.num_labels();
        if let Some(&label) = labels.iter().find(|&&label| label >= num_labels) {
            return Err(Error::InvalidLabel {
                label,
                num_classes: num_labels,
            });
        }

        if token_ids.is_empty() || num_epochs == 0 {
            tracing::warn!("Nothing to fit: {} rows, {num_epochs} epochs", token_ids.len());
            return Ok(());
        }

        let items: Vec<TrainingItem> = token_ids
            .iter()
            .zip(input_mask)
            .zip(labels)
            .map(|((ids, mask), &label)| TrainingItem::new(ids.clone(), mask.clone(), label))
            .collect();

        let total_steps = steps_per_epoch(items.len(), batch_size, num_workers) * num_epochs;
        let warmup_steps = (total_steps as f64 * self.options.warmup_proportion) as usize;

        let batcher = TextClassificationBatcher::<B>::new(self.device.clone());
        let mut builder = DataLoaderBuilder::new(batcher)
            .batch_size(batch_size)
            .shuffle(self.options.seed);
        if num_workers > 0 {
            builder = builder.num_workers(num_workers);
        }
        let dataloader = builder.build(InMemDataset::new(items));

        let mut optim = AdamWConfig::new()
            .with_epsilon(1e-6)
            .with_weight_decay(self.options.weight_decay)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(1.0)))
            .init();

        tracing::info!(
            "Fitting on {} rows: {num_epochs} epochs, batch size {batch_size}, {num_workers} workers",
            token_ids.len()
        );

        let mut model = self.model.clone();
        let mut step = 0usize;

        for epoch in 1..=num_epochs {
            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;

            for batch in dataloader.iter() {
                let lr = learning_rate(
                    self.options.learning_rate,
                    step.min(total_steps.saturating_sub(1)),
                    warmup_steps,
                    total_steps,
                );

                let (updated, loss) = guard_resources(batch_size, || {
                    let output = model.forward(batch);
                    let loss = output.loss.clone().into_scalar().elem::<f64>();
                    let grads = GradientsParams::from_grads(output.loss.backward(), &model);
                    (optim.step(lr, model, grads), loss)
                })?;
                model = updated;

                loss_sum += loss;
                batches += 1;
                step += 1;

                if self.options.log_interval > 0 && step % self.options.log_interval == 0 {
                    tracing::info!(
                        "epoch {epoch}/{num_epochs} step {step}/{total_steps} | running loss {:.4} | lr {lr:.2e}",
                        loss_sum / batches as f64
                    );
                }
            }

            if batches > 0 {
                tracing::info!(
                    "epoch {epoch}/{num_epochs} done | mean loss {:.4}",
                    loss_sum / batches as f64
                );
            }
        }

        self.model = model;
        self.state = match self.state {
            ClassifierState::Untrained => ClassifierState::Trained { epochs: num_epochs },
            ClassifierState::Trained { epochs } => ClassifierState::Trained {
                epochs: epochs + num_epochs,
            },
        };
        Ok(())
    }
}

/// Batches in one pass over `rows` rows.
///
/// With several workers the loader cuts the rows into one contiguous partition per worker (the
/// last one takes the remainder) and batches each partition on its own.
pub(crate) fn steps_per_epoch(rows: usize, batch_size: usize, num_workers: usize) -> usize {
    if num_workers <= 1 {
        return rows.div_ceil(batch_size);
    }
    let part = rows / num_workers;
    let last = rows - part * (num_workers - 1);
    part.div_ceil(batch_size) * (num_workers - 1) + last.div_ceil(batch_size)
}

/// Linear warmup over `warmup_steps`, then linear decay to zero at `total_steps`.
pub(crate) fn learning_rate(base: f64, step: usize, warmup_steps: usize, total_steps: usize) -> f64 {
    if step < warmup_steps {
        return base * (step + 1) as f64 / warmup_steps as f64;
    }
    let remaining = total_steps.saturating_sub(step) as f64;
    let decay_steps = total_steps.saturating_sub(warmup_steps).max(1) as f64;
    base * (remaining / decay_steps).max(0.0)
}
