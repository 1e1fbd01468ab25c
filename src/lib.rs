pub mod config;
pub mod dataset;
pub mod error;
pub mod generation;
pub mod model;
pub mod tokenizer;
pub mod train;

pub use config::{
    DatasetConfig, GenerationConfig, TrainingConfig, TrainingHyperparameters, load_training_config,
};
pub use dataset::{
    Batch, BatchGenerator, Corpus, CorpusSplits, CyclicDataLoader, DatasetSplit, PreparedData,
    TextBatch, TokenGrid, epoch_size, prepare_data,
};
pub use error::{CharRnnError, Result};
pub use generation::{
    SelectionPolicy, Seed, SequenceSampler, argmax, probabilities_from_logits, select_next,
};
pub use model::{SequenceModel, StepModel};
pub use tokenizer::char_vocab::CharVocab;
pub use tokenizer::{FALLBACK_ID, TokenId};
pub use train::{EpochMode, EpochReport, EpochRunner, RunningAverage};
