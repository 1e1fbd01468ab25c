use std::sync::{Arc, Mutex, PoisonError};

use burn::data::dataloader::{DataLoader, DataLoaderIterator, Progress};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::batch_generator::{Batch, BatchGenerator};

/// Inputs and targets of one truncated-BPTT step, each `[batch_size, unroll_count]`.
#[derive(Clone)]
pub struct TextBatch<B: Backend> {
    pub inputs: Tensor<B, 2, Int>,
    pub targets: Tensor<B, 2, Int>,
}

impl<B: Backend> TextBatch<B> {
    pub fn from_batch(batch: &Batch, device: &B::Device) -> Self {
        let (inputs, targets) = batch.split();
        Self {
            inputs: inputs.to_tensor::<B>(device),
            targets: targets.to_tensor::<B>(device),
        }
    }
}

/// Burn data loader over a shared [`BatchGenerator`].
///
/// Each iteration yields `steps_per_epoch` batches. The generator lives behind
/// a mutex shared by every clone, slice and iterator of the loader, so each
/// stream stays contiguous from one epoch to the next.
pub struct CyclicDataLoader<B: Backend> {
    generator: Arc<Mutex<BatchGenerator>>,
    device: B::Device,
    steps_per_epoch: usize,
    batch_size: usize,
}

impl<B: Backend> Clone for CyclicDataLoader<B> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            device: self.device.clone(),
            steps_per_epoch: self.steps_per_epoch,
            batch_size: self.batch_size,
        }
    }
}

impl<B: Backend> CyclicDataLoader<B> {
    /// Loader sized to one pass over the generator's own text.
    pub fn new(generator: BatchGenerator, device: &B::Device) -> Self {
        let steps_per_epoch = generator.epoch_size();
        Self::with_steps_per_epoch(generator, device, steps_per_epoch)
    }

    pub fn with_steps_per_epoch(
        generator: BatchGenerator,
        device: &B::Device,
        steps_per_epoch: usize,
    ) -> Self {
        let batch_size = generator.batch_size();
        Self {
            generator: Arc::new(Mutex::new(generator)),
            device: device.clone(),
            steps_per_epoch,
            batch_size,
        }
    }

    pub fn steps_per_epoch(&self) -> usize {
        self.steps_per_epoch
    }

    pub fn generator(&self) -> Arc<Mutex<BatchGenerator>> {
        Arc::clone(&self.generator)
    }
}

impl<B> DataLoader<B, TextBatch<B>> for CyclicDataLoader<B>
where
    B: Backend + 'static,
    B::Device: Clone,
{
    fn iter<'a>(&'a self) -> Box<dyn DataLoaderIterator<TextBatch<B>> + 'a> {
        Box::new(CyclicIterator {
            generator: Arc::clone(&self.generator),
            device: self.device.clone(),
            steps_total: self.steps_per_epoch,
            step: 0,
            batch_size: self.batch_size,
        })
    }

    fn num_items(&self) -> usize {
        self.steps_per_epoch * self.batch_size
    }

    fn to_device(&self, device: &B::Device) -> Arc<dyn DataLoader<B, TextBatch<B>>> {
        Arc::new(Self {
            generator: Arc::clone(&self.generator),
            device: device.clone(),
            steps_per_epoch: self.steps_per_epoch,
            batch_size: self.batch_size,
        })
    }

    fn slice(&self, start: usize, end: usize) -> Arc<dyn DataLoader<B, TextBatch<B>>> {
        let end = end.min(self.steps_per_epoch);
        let start = start.min(end);

        Arc::new(Self {
            generator: Arc::clone(&self.generator),
            device: self.device.clone(),
            steps_per_epoch: end - start,
            batch_size: self.batch_size,
        })
    }
}

struct CyclicIterator<B: Backend> {
    generator: Arc<Mutex<BatchGenerator>>,
    device: B::Device,
    steps_total: usize,
    step: usize,
    batch_size: usize,
}

impl<B: Backend> Iterator for CyclicIterator<B> {
    type Item = TextBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step >= self.steps_total {
            return None;
        }
        self.step += 1;

        // next_batch never leaves the cursors half-updated, so a poisoned lock
        // still guards a usable generator
        let batch = self
            .generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_batch();

        Some(TextBatch::from_batch(&batch, &self.device))
    }
}

impl<B: Backend> DataLoaderIterator<TextBatch<B>> for CyclicIterator<B> {
    fn progress(&self) -> Progress {
        Progress::new(
            self.step * self.batch_size,
            self.steps_total * self.batch_size,
        )
    }
}
