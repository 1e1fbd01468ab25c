pub mod char_vocab;

use std::path::{Path, PathBuf};

use char_vocab::CharVocab;
use tracing::info;

use crate::error::Result;

pub type TokenId = u32;

/// Id substituted for characters the vocabulary has never seen.
pub const FALLBACK_ID: TokenId = 0;

/// Resolve where the vocabulary for a corpus is cached.
pub fn storage_path(vocab_path: Option<&Path>, cache_dir: &Path) -> PathBuf {
    match vocab_path {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cache_dir.join(path),
        None => cache_dir.join("vocab.json"),
    }
}

/// Load the vocabulary stored at `path`, or fit one over `texts` and store it
/// there so later runs map characters to the same ids.
pub fn fit_or_load<'a, I>(path: &Path, texts: I) -> Result<CharVocab>
where
    I: Iterator<Item = &'a str>,
{
    if path.is_file() {
        return CharVocab::load(path);
    }

    let vocab = CharVocab::fit(texts)?;
    vocab.save(path)?;
    info!(
        path = %path.display(),
        vocab_size = vocab.len(),
        "created character vocabulary"
    );
    Ok(vocab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn storage_path_resolves_relative_to_cache() {
        let cache = Path::new("/tmp/cache");
        assert_eq!(storage_path(None, cache), cache.join("vocab.json"));
        assert_eq!(
            storage_path(Some(Path::new("chars.json")), cache),
            cache.join("chars.json")
        );
        assert_eq!(
            storage_path(Some(Path::new("/abs/chars.json")), cache),
            PathBuf::from("/abs/chars.json")
        );
    }

    #[test]
    fn fit_or_load_reuses_stored_vocabulary() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("vocab.json");

        let first = fit_or_load(&path, std::iter::once("abc")).expect("fit");
        assert!(path.is_file());

        let second = fit_or_load(&path, std::iter::once("completely different")).expect("load");
        assert_eq!(first, second);
    }
}
