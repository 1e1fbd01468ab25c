pub mod batch_generator;
pub mod loader;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, info};

pub use batch_generator::{Batch, BatchGenerator, TokenGrid, epoch_size};
pub use loader::{CyclicDataLoader, TextBatch};

use crate::config::DatasetConfig;
use crate::error::{CharRnnError, Result};
use crate::tokenizer::{self, char_vocab::CharVocab};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetSplit {
    Train,
    Valid,
    Test,
}

/// Raw training text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    text: String,
}

/// Train, validation and test views over a [`Corpus`], in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusSplits<'a> {
    pub train: &'a str,
    pub valid: &'a str,
    pub test: &'a str,
}

impl<'a> CorpusSplits<'a> {
    pub fn get(&self, split: DatasetSplit) -> &'a str {
        match split {
            DatasetSplit::Train => self.train,
            DatasetSplit::Valid => self.valid,
            DatasetSplit::Test => self.test,
        }
    }
}

impl Corpus {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(CharRnnError::EmptyText);
        }
        Ok(Self { text })
    }

    /// Read the corpus at `path`, downloading it from `url` first when the
    /// file does not exist yet.
    pub fn load(path: &Path, url: Option<&str>) -> Result<Self> {
        if !path.exists() {
            if let Some(url) = url {
                download(url, path)?;
            }
        }
        let text = fs::read_to_string(path)?;
        debug!(path = %path.display(), chars = text.chars().count(), "loaded corpus");
        Self::new(text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Carve validation and test fractions off the tail of the text, measured
    /// in characters.
    pub fn split(&self, valid_fraction: f32, test_fraction: f32) -> CorpusSplits<'_> {
        let total = self.text.chars().count();
        let valid_len = fraction_of(total, valid_fraction);
        let test_len = fraction_of(total, test_fraction).min(total - valid_len);
        let train_len = total - valid_len - test_len;

        let train_end = self.byte_offset(train_len);
        let valid_end = self.byte_offset(train_len + valid_len);

        CorpusSplits {
            train: &self.text[..train_end],
            valid: &self.text[train_end..valid_end],
            test: &self.text[valid_end..],
        }
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map_or(self.text.len(), |(offset, _)| offset)
    }
}

fn fraction_of(total: usize, fraction: f32) -> usize {
    let fraction = fraction.clamp(0.0, 1.0) as f64;
    ((total as f64) * fraction) as usize
}

/// Corpus plus the vocabulary fitted over all of it.
#[derive(Debug, Clone)]
pub struct PreparedData {
    corpus: Corpus,
    vocab: CharVocab,
    valid_fraction: f32,
    test_fraction: f32,
}

impl PreparedData {
    pub fn new(corpus: Corpus, vocab: CharVocab, valid_fraction: f32, test_fraction: f32) -> Self {
        Self {
            corpus,
            vocab,
            valid_fraction,
            test_fraction,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn vocab(&self) -> &CharVocab {
        &self.vocab
    }

    pub fn splits(&self) -> CorpusSplits<'_> {
        self.corpus.split(self.valid_fraction, self.test_fraction)
    }

    /// Character count of `split`.
    pub fn data_size(&self, split: DatasetSplit) -> usize {
        self.splits().get(split).chars().count()
    }

    pub fn generator(
        &self,
        split: DatasetSplit,
        batch_size: usize,
        unroll_count: usize,
    ) -> Result<BatchGenerator> {
        BatchGenerator::new(
            self.splits().get(split),
            batch_size,
            unroll_count,
            &self.vocab,
        )
    }
}

/// Load the corpus described by `config` and fit (or reload) its vocabulary.
pub fn prepare_data(config: &DatasetConfig) -> Result<PreparedData> {
    fs::create_dir_all(&config.cache_dir)?;
    let corpus = Corpus::load(&config.path, config.url.as_deref())?;

    let vocab_path = tokenizer::storage_path(config.vocab_path.as_deref(), &config.cache_dir);
    let vocab = tokenizer::fit_or_load(&vocab_path, std::iter::once(corpus.text()))?;
    if config.strict_vocab {
        vocab.validate_corpus(corpus.text())?;
    }

    info!(
        chars = corpus.text().chars().count(),
        vocab_size = vocab.len(),
        "prepared dataset"
    );

    Ok(PreparedData::new(
        corpus,
        vocab,
        config.valid_fraction,
        config.test_fraction,
    ))
}

fn download(url: &str, path: &Path) -> Result<()> {
    info!(url, path = %path.display(), "downloading corpus");
    let response = ureq::get(url)
        .call()
        .map_err(|err| CharRnnError::Download(err.to_string()))?;

    let mut reader = response.into_reader();
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(&contents)?;
    Ok(())
}
