use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::error::{CharRnnError, Result};
use crate::tokenizer::TokenId;
use crate::tokenizer::char_vocab::CharVocab;

/// Number of [`BatchGenerator::next_batch`] calls that make up one pass over
/// `data_size` characters.
pub fn epoch_size(data_size: usize, batch_size: usize, unroll_count: usize) -> usize {
    if batch_size == 0 || unroll_count == 0 {
        return 0;
    }
    (data_size / batch_size).saturating_sub(1) / unroll_count
}

/// Ids laid out row-major as `[rows][cols]`, one row per stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrid {
    rows: usize,
    cols: usize,
    ids: Vec<TokenId>,
}

impl TokenGrid {
    pub fn new(rows: usize, cols: usize, ids: Vec<TokenId>) -> Self {
        debug_assert_eq!(rows * cols, ids.len(), "grid shape must match id count");
        Self { rows, cols, ids }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> TokenId {
        self.ids[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[TokenId] {
        &self.ids[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        let data: Vec<i64> = self.ids.iter().map(|&id| id as i64).collect();
        Tensor::<B, 2, Int>::from_data(TensorData::new(data, [self.rows, self.cols]), device)
    }
}

/// `unroll_count + 1` consecutive time slices, each holding one id per stream.
///
/// The first slice repeats the last slice of the previous batch, so slices
/// `[0, U)` are the inputs and `[1, U]` the targets of a truncated-BPTT step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    steps: Vec<Vec<TokenId>>,
}

impl Batch {
    pub fn steps(&self) -> &[Vec<TokenId>] {
        &self.steps
    }

    /// Number of time slices, always `unroll_count + 1`.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.steps.first().map_or(0, Vec::len)
    }

    pub fn unroll_count(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn first_step(&self) -> &[TokenId] {
        &self.steps[0]
    }

    pub fn last_step(&self) -> &[TokenId] {
        &self.steps[self.steps.len() - 1]
    }

    /// Inputs as `[batch_size][unroll_count]`.
    pub fn inputs(&self) -> TokenGrid {
        stream_major(&self.steps[..self.steps.len() - 1])
    }

    /// Targets as `[batch_size][unroll_count]`, the inputs shifted by one step.
    pub fn targets(&self) -> TokenGrid {
        stream_major(&self.steps[1..])
    }

    pub fn split(&self) -> (TokenGrid, TokenGrid) {
        (self.inputs(), self.targets())
    }

    /// Render every stream of the batch back into text.
    pub fn decode_streams(&self, vocab: &CharVocab) -> Result<Vec<String>> {
        let mut streams = vec![String::with_capacity(self.len()); self.batch_size()];
        for step in &self.steps {
            for (stream, &id) in streams.iter_mut().zip(step) {
                stream.push(vocab.id_to_char(id)?);
            }
        }
        Ok(streams)
    }
}

fn stream_major(steps: &[Vec<TokenId>]) -> TokenGrid {
    let rows = steps.first().map_or(0, Vec::len);
    let cols = steps.len();
    let mut ids = Vec::with_capacity(rows * cols);
    for stream in 0..rows {
        ids.extend(steps.iter().map(|step| step[stream]));
    }
    TokenGrid::new(rows, cols, ids)
}

/// Endless, cyclic producer of truncated-BPTT batches.
///
/// `batch_size` cursors start evenly spaced across the text and each advances
/// one character per time slice, wrapping at the end of the text. The
/// generator has no notion of epochs; use [`epoch_size`] to bound a pass.
/// Not synchronized: share it behind a lock or give each worker its own.
#[derive(Debug, Clone)]
pub struct BatchGenerator {
    tokens: Vec<TokenId>,
    batch_size: usize,
    unroll_count: usize,
    vocab_size: usize,
    cursors: Vec<usize>,
    last_step: Vec<TokenId>,
}

impl BatchGenerator {
    pub fn new(
        text: &str,
        batch_size: usize,
        unroll_count: usize,
        vocab: &CharVocab,
    ) -> Result<Self> {
        Self::from_tokens(vocab.encode(text), batch_size, unroll_count, vocab.len())
    }

    /// Build a generator over already encoded text. Every id must be below
    /// `vocab_size`.
    pub fn from_tokens(
        tokens: Vec<TokenId>,
        batch_size: usize,
        unroll_count: usize,
        vocab_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(CharRnnError::InvalidHyperparameter { name: "batch_size" });
        }
        if unroll_count == 0 {
            return Err(CharRnnError::InvalidHyperparameter {
                name: "unroll_count",
            });
        }
        if tokens.is_empty() {
            return Err(CharRnnError::EmptyText);
        }
        if tokens.len() < batch_size {
            return Err(CharRnnError::DegenerateSpacing {
                text_size: tokens.len(),
                batch_size,
            });
        }
        if let Some(&id) = tokens.iter().find(|&&id| id as usize >= vocab_size) {
            return Err(CharRnnError::InvalidId { id, vocab_size });
        }

        let segment = tokens.len() / batch_size;
        let cursors = (0..batch_size).map(|offset| offset * segment).collect();

        let mut generator = Self {
            tokens,
            batch_size,
            unroll_count,
            vocab_size,
            cursors,
            last_step: Vec::new(),
        };
        generator.last_step = generator.next_step();
        Ok(generator)
    }

    pub fn text_size(&self) -> usize {
        self.tokens.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn unroll_count(&self) -> usize {
        self.unroll_count
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn cursors(&self) -> &[usize] {
        &self.cursors
    }

    /// Batches per pass over this generator's own text.
    pub fn epoch_size(&self) -> usize {
        epoch_size(self.text_size(), self.batch_size, self.unroll_count)
    }

    /// Read one id per stream and advance every cursor by one, wrapping at the
    /// end of the text.
    pub fn next_step(&mut self) -> Vec<TokenId> {
        let text_size = self.tokens.len();
        self.cursors
            .iter_mut()
            .map(|cursor| {
                let id = self.tokens[*cursor];
                *cursor = (*cursor + 1) % text_size;
                id
            })
            .collect()
    }

    /// The previous batch's last slice followed by `unroll_count` fresh ones.
    pub fn next_batch(&mut self) -> Batch {
        let mut steps = Vec::with_capacity(self.unroll_count + 1);
        steps.push(self.last_step.clone());
        for _ in 0..self.unroll_count {
            steps.push(self.next_step());
        }
        self.last_step.clone_from(&steps[self.unroll_count]);
        Batch { steps }
    }
}

impl Iterator for BatchGenerator {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}
