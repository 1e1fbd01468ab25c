//! Seams to the recurrent network. The network's architecture and parameter
//! updates live behind these traits; this crate only threads recurrent state
//! through them explicitly, one call at a time.

use anyhow::Result;

use crate::dataset::TokenGrid;
use crate::tokenizer::TokenId;

/// Single-character inference step used for sampling.
pub trait StepModel {
    /// Recurrent state carried from one step to the next.
    type State;

    /// Width of the probability vector returned by [`step`](Self::step).
    fn vocab_size(&self) -> usize;

    /// Initial state for `batch_size` independent streams.
    fn zero_state(&self, batch_size: usize) -> Self::State;

    /// Feed one id with batch size 1 and sequence length 1, returning the
    /// distribution over the next id and the updated state.
    fn step(&self, input: TokenId, state: Self::State) -> Result<(Vec<f32>, Self::State)>;
}

/// Unrolled step over a `[batch_size, unroll_count]` window used by the epoch
/// driver.
pub trait SequenceModel {
    type State;

    fn zero_state(&self, batch_size: usize) -> Self::State;

    /// Update parameters on one window and return its mean cross-entropy loss
    /// over `batch_size * unroll_count` predictions.
    fn train_step(
        &mut self,
        inputs: &TokenGrid,
        targets: &TokenGrid,
        state: Self::State,
    ) -> Result<(f32, Self::State)>;

    /// Loss on one window without touching parameters.
    fn eval_step(
        &mut self,
        inputs: &TokenGrid,
        targets: &TokenGrid,
        state: Self::State,
    ) -> Result<(f32, Self::State)>;
}
