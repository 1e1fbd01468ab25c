use thiserror::Error;

use crate::tokenizer::TokenId;

/// Errors raised by the batching and sampling pipeline.
#[derive(Debug, Error)]
pub enum CharRnnError {
    #[error("character {0:?} is not part of the vocabulary")]
    UnknownCharacter(char),

    #[error("token id {id} outside vocabulary of size {vocab_size}")]
    InvalidId { id: TokenId, vocab_size: usize },

    #[error("text must contain at least one character")]
    EmptyText,

    #[error("text of {text_size} characters cannot feed {batch_size} streams")]
    DegenerateSpacing { text_size: usize, batch_size: usize },

    #[error("{name} must be at least 1")]
    InvalidHyperparameter { name: &'static str },

    #[error("sampling requires a non-empty seed text or an explicit start id")]
    UndefinedSeed,

    #[error("vocabulary has {vocab_size} entries but the model emits {model_vocab_size} outputs")]
    VocabularyMismatch {
        vocab_size: usize,
        model_vocab_size: usize,
    },

    #[error("step function returned {actual} probabilities, expected {expected}")]
    DistributionWidth { expected: usize, actual: usize },

    #[error("cannot sample from distribution: {0}")]
    InvalidDistribution(String),

    #[error(
        "data size {data_size} yields no full batch for batch size {batch_size} and unroll count {unroll_count}"
    )]
    EmptyEpoch {
        data_size: usize,
        batch_size: usize,
        unroll_count: usize,
    },

    #[error("vocabulary cannot be empty")]
    EmptyVocabulary,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("download failed: {0}")]
    Download(String),

    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CharRnnError>;
