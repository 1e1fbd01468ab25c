use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::Deserialize;

use crate::error::{CharRnnError, Result};
use crate::model::StepModel;
use crate::tokenizer::TokenId;
use crate::tokenizer::char_vocab::CharVocab;

/// How the next id is picked from a step's probability vector.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Most probable id, lowest id on ties.
    Argmax,
    /// Draw from the categorical distribution.
    #[default]
    Stochastic,
}

/// Context the sampler starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seed<'a> {
    /// Every character but the last only advances the state; the last one is
    /// the first input. Must not be empty.
    Text(&'a str),
    /// Start from a bare id with a zero state.
    Id(TokenId),
}

/// Drives a [`StepModel`] autoregressively, one character at a time.
pub struct SequenceSampler<'a, M: StepModel> {
    model: &'a M,
    vocab: &'a CharVocab,
}

impl<'a, M: StepModel> SequenceSampler<'a, M> {
    /// Fails unless the model emits exactly one probability per vocabulary
    /// entry.
    pub fn new(model: &'a M, vocab: &'a CharVocab) -> Result<Self> {
        if model.vocab_size() != vocab.len() {
            return Err(CharRnnError::VocabularyMismatch {
                vocab_size: vocab.len(),
                model_vocab_size: model.vocab_size(),
            });
        }
        Ok(Self { model, vocab })
    }

    /// Warm the zero state up on the seed and return it with the first input.
    pub fn prefill(&self, seed: Seed<'_>) -> Result<(M::State, TokenId)> {
        let mut state = self.model.zero_state(1);
        match seed {
            Seed::Text(text) => {
                let ids = self.vocab.encode(text);
                let Some((&last, context)) = ids.split_last() else {
                    return Err(CharRnnError::UndefinedSeed);
                };
                for &id in context {
                    let (_, next_state) = self.model.step(id, state)?;
                    state = next_state;
                }
                Ok((state, last))
            }
            Seed::Id(id) => {
                self.vocab.id_to_char(id)?;
                Ok((state, id))
            }
        }
    }

    /// Generate `length` ids following the seed.
    pub fn sample_ids<R: Rng + ?Sized>(
        &self,
        seed: Seed<'_>,
        length: usize,
        policy: SelectionPolicy,
        rng: &mut R,
    ) -> Result<Vec<TokenId>> {
        let (mut state, mut input) = self.prefill(seed)?;
        let mut generated = Vec::with_capacity(length);
        for _ in 0..length {
            let (probs, next_state) = self.model.step(input, state)?;
            if probs.len() != self.vocab.len() {
                return Err(CharRnnError::DistributionWidth {
                    expected: self.vocab.len(),
                    actual: probs.len(),
                });
            }
            state = next_state;
            input = select_next(&probs, policy, rng)?;
            generated.push(input);
        }
        Ok(generated)
    }

    /// The seed followed by `length` generated characters. A [`Seed::Id`]
    /// contributes its own character.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        seed: Seed<'_>,
        length: usize,
        policy: SelectionPolicy,
        rng: &mut R,
    ) -> Result<String> {
        let generated = self.sample_ids(seed, length, policy, rng)?;
        let mut output = match seed {
            Seed::Text(text) => text.to_string(),
            Seed::Id(id) => self.vocab.id_to_char(id)?.to_string(),
        };
        output.push_str(&self.vocab.decode(&generated)?);
        Ok(output)
    }
}

pub fn select_next<R: Rng + ?Sized>(
    probs: &[f32],
    policy: SelectionPolicy,
    rng: &mut R,
) -> Result<TokenId> {
    match policy {
        SelectionPolicy::Argmax => argmax(probs).ok_or_else(|| {
            CharRnnError::InvalidDistribution("no finite probability to pick".to_string())
        }),
        SelectionPolicy::Stochastic => {
            let dist = WeightedIndex::new(probs)
                .map_err(|err| CharRnnError::InvalidDistribution(err.to_string()))?;
            Ok(dist.sample(rng) as TokenId)
        }
    }
}

/// Index of the largest value, preferring the lowest index on ties. NaN
/// entries are skipped.
pub fn argmax(probs: &[f32]) -> Option<TokenId> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in probs.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx as TokenId)
}

/// Softmax over `logits / temperature`, for models that expose raw logits.
pub fn probabilities_from_logits<B: Backend>(
    logits: Tensor<B, 1>,
    temperature: f32,
) -> Result<Vec<f32>> {
    if temperature.is_nan() || temperature <= 0.0 {
        return Err(CharRnnError::InvalidDistribution(format!(
            "temperature must be positive, got {temperature}"
        )));
    }

    let logits_values = logits
        .div_scalar(temperature)
        .to_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|err| CharRnnError::InvalidDistribution(format!("{err:?}")))?;
    let vocab = logits_values.len();

    let max_logit = logits_values
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits_values
        .iter()
        .map(|value| (value - max_logit).exp())
        .collect();
    let sum: f32 = probs.iter().sum();
    if sum == 0.0 || sum.is_nan() {
        let uniform = 1.0 / vocab as f32;
        probs.fill(uniform);
    } else {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }

    Ok(probs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type Backend = NdArray<f32>;

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn stochastic_selection_rejects_degenerate_distribution() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = select_next(&[0.0, 0.0], SelectionPolicy::Stochastic, &mut rng).unwrap_err();
        assert!(matches!(err, CharRnnError::InvalidDistribution(_)));
        let err = select_next(&[], SelectionPolicy::Argmax, &mut rng).unwrap_err();
        assert!(matches!(err, CharRnnError::InvalidDistribution(_)));
    }

    #[test]
    fn stochastic_selection_never_picks_zero_mass() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let id = select_next(&[0.0, 0.7, 0.0, 0.3], SelectionPolicy::Stochastic, &mut rng)
                .expect("sample");
            assert!(id == 1 || id == 3);
        }
    }

    #[test]
    fn softmax_of_logits_sums_to_one() {
        let device = Default::default();
        let logits =
            Tensor::<Backend, 1>::from_data(TensorData::new(vec![1.0f32, 2.0, 3.0], [3]), &device);
        let probs = probabilities_from_logits(logits, 1.0).expect("probs");
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] < probs[1] && probs[1] < probs[2]);
        assert_eq!(argmax(&probs), Some(2));
    }

    #[test]
    fn low_temperature_sharpens_distribution() {
        let device = Default::default();
        let data = TensorData::new(vec![1.0f32, 2.0], [2]);
        let warm = Tensor::<Backend, 1>::from_data(data.clone(), &device);
        let cold = Tensor::<Backend, 1>::from_data(data, &device);
        let warm = probabilities_from_logits(warm, 1.0).expect("warm");
        let cold = probabilities_from_logits(cold, 0.1).expect("cold");
        assert!(cold[1] > warm[1]);
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        let device = Default::default();
        let logits = Tensor::<Backend, 1>::from_data(TensorData::new(vec![0.5f32], [1]), &device);
        assert!(probabilities_from_logits(logits, 0.0).is_err());
    }

    #[test]
    fn policy_deserializes_from_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            policy: SelectionPolicy,
        }
        let holder: Holder = toml::from_str("policy = \"argmax\"").expect("parse");
        assert_eq!(holder.policy, SelectionPolicy::Argmax);
    }
}
