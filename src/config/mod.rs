use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;

use crate::error::CharRnnError;
use crate::generation::{SelectionPolicy, Seed};
use crate::tokenizer::TokenId;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatasetConfig {
    /// Training text.
    pub path: PathBuf,
    /// Fetched into `path` when the file is missing.
    #[serde(default)]
    pub url: Option<String>,
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub vocab_path: Option<PathBuf>,
    #[serde(default = "default_holdout_fraction")]
    pub valid_fraction: f32,
    #[serde(default = "default_holdout_fraction")]
    pub test_fraction: f32,
    #[serde(default)]
    pub strict_vocab: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrainingHyperparameters {
    pub batch_size: usize,
    pub unroll_count: usize,
    #[serde(default = "default_log_frequency")]
    pub log_frequency: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default)]
    pub seed_text: String,
    #[serde(default)]
    pub start_id: Option<TokenId>,
    pub length: usize,
    #[serde(default)]
    pub policy: SelectionPolicy,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl GenerationConfig {
    /// Seed text wins over `start_id`; with neither the seed is undefined.
    pub fn seed(&self) -> crate::Result<Seed<'_>> {
        if !self.seed_text.is_empty() {
            return Ok(Seed::Text(&self.seed_text));
        }
        self.start_id.map(Seed::Id).ok_or(CharRnnError::UndefinedSeed)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrainingConfig {
    pub dataset: DatasetConfig,
    pub training: TrainingHyperparameters,
    pub generation: GenerationConfig,
}

/// Read the TOML files in order, letting later files override earlier ones
/// table by table.
pub fn load_training_config(paths: &[PathBuf]) -> Result<TrainingConfig> {
    if paths.is_empty() {
        return Err(anyhow!("at least one configuration path is required"));
    }

    let mut iter = paths.iter();
    let first_path = iter
        .next()
        .ok_or_else(|| anyhow!("configuration iterator unexpectedly empty"))?;
    let mut value = load_value(first_path)?;

    for path in iter {
        let overlay = load_value(path)?;
        merge_values(&mut value, overlay);
    }

    value
        .try_into::<TrainingConfig>()
        .map_err(|err| anyhow!(err))
}

fn load_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    let table: toml::value::Table = toml::from_str(&content)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;
    Ok(Value::Table(table))
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn default_holdout_fraction() -> f32 {
    0.05
}

fn default_log_frequency() -> usize {
    10
}
